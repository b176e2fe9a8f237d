//! Server configuration and shared state.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uploader_core::{RecordStore, StoreConfig, DEFAULT_CHUNK_SIZE};

use crate::auth::Authenticator;
use crate::error::StartupError;
use crate::stats::Statistic;

/// Default listen port.
const DEFAULT_PORT: u16 = 4001;

/// Default upload size limit (1 GB).
const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub chunk_size: usize,
    pub secret_key: String,
    /// Apply SQLite pragmas for a Litestream-replicated database
    pub litestream: bool,
    pub max_upload_bytes: usize,
    /// CORS allow-lists; `*` in origins or headers means any
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Clients allowed on `/sys/*` (empty = unrestricted)
    pub allowed_ips: Vec<String>,
    pub enable_stats: bool,
    pub enable_health: bool,
    /// Delete chunk rows without metadata before serving
    pub purge_orphans: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from("data/database.db"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            secret_key: String::new(),
            litestream: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_origins: Vec::new(),
            allowed_methods: vec!["GET".into(), "POST".into(), "PUT".into(), "DELETE".into()],
            allowed_headers: Vec::new(),
            allowed_ips: Vec::new(),
            enable_stats: false,
            enable_health: false,
            purge_orphans: false,
        }
    }
}

impl ServerConfig {
    /// Record store settings derived from this config
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: Some(self.db_path.clone()),
            chunk_size: self.chunk_size,
            optimize_for_litestream: self.litestream,
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub auth: Authenticator,
    pub stats: Arc<Statistic>,
    pub config: Arc<ServerConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build state around an already opened store.
    pub fn new(config: ServerConfig, store: RecordStore) -> Result<Self, StartupError> {
        let auth = Authenticator::new(&config.secret_key)?;
        Ok(Self {
            store,
            auth,
            stats: Arc::new(Statistic::new()),
            config: Arc::new(config),
            started_at: Utc::now(),
        })
    }

    /// Open the store described by `config`, run the optional orphan sweep
    /// and build the state.
    pub fn open(config: ServerConfig) -> Result<Self, StartupError> {
        let store = RecordStore::open(&config.store_config())?;

        if config.purge_orphans {
            let purged = store.purge_orphaned_chunks()?;
            tracing::info!(purged, "Orphaned chunk sweep finished");
        }

        Self::new(config, store)
    }

    /// Seconds since the server started.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
