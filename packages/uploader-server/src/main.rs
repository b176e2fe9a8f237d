//! Uploader Server
//!
//! Stores uploaded files in a single SQLite database, split into chunk
//! rows, and serves them back with range support. A single shared secret
//! guards every mutating endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use uploader_core::DEFAULT_CHUNK_SIZE;
use uploader_server::{router, stats, AppState, ServerConfig, StartupError};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uploader-server", version, about = "Chunked file upload server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 4001, env = "PORT")]
    port: u16,

    /// SQLite database file (parent directories are created)
    #[arg(long, default_value = "data/database.db", env = "UPLOADER_DB_PATH")]
    db_path: PathBuf,

    /// Bytes per stored chunk row
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "UPLOADER_CHUNK_SIZE")]
    chunk_size: usize,

    /// Shared secret required to log in
    #[arg(long, env = "UPLOADER_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// Set when the database is replicated by Litestream.
    /// Any non-empty bucket name enables the matching SQLite settings.
    #[arg(long, env = "LITESTREAM_BUCKET")]
    litestream_bucket: Option<String>,

    /// Largest accepted upload body in bytes
    #[arg(long, default_value_t = 1024 * 1024 * 1024, env = "UPLOADER_MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,

    /// CORS origins (comma-separated, `*` for any)
    #[arg(long, env = "UPLOADER_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// CORS methods (comma-separated)
    #[arg(
        long,
        env = "UPLOADER_ALLOWED_METHODS",
        value_delimiter = ',',
        default_value = "GET,POST,PUT,DELETE"
    )]
    allowed_methods: Vec<String>,

    /// CORS request headers (comma-separated, `*` for any)
    #[arg(long, env = "UPLOADER_ALLOWED_HEADERS", value_delimiter = ',')]
    allowed_headers: Vec<String>,

    /// Client IPs allowed on /sys/* (comma-separated, empty for all)
    #[arg(long, env = "UPLOADER_ALLOWED_IPS", value_delimiter = ',')]
    allowed_ips: Vec<String>,

    /// Serve /sys/stats
    #[arg(long, env = "UPLOADER_ENABLE_STATS")]
    enable_stats: bool,

    /// Serve /sys/health and /sys/info
    #[arg(long, env = "UPLOADER_ENABLE_HEALTH")]
    enable_health: bool,

    /// Delete chunk rows left behind by interrupted uploads before serving
    #[arg(long, env = "UPLOADER_PURGE_ORPHANS")]
    purge_orphans: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "UPLOADER_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let non_empty = |list: Vec<String>| -> Vec<String> {
            list.into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };

        ServerConfig {
            port: self.port,
            db_path: self.db_path,
            chunk_size: self.chunk_size,
            secret_key: self.secret_key,
            litestream: self
                .litestream_bucket
                .is_some_and(|bucket| !bucket.trim().is_empty()),
            max_upload_bytes: self.max_upload_bytes,
            allowed_origins: non_empty(self.allowed_origins),
            allowed_methods: non_empty(self.allowed_methods),
            allowed_headers: non_empty(self.allowed_headers),
            allowed_ips: non_empty(self.allowed_ips),
            enable_stats: self.enable_stats,
            enable_health: self.enable_health,
            purge_orphans: self.purge_orphans,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "uploader_server=info,uploader_core=info,tower_http=info".into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = args.into_config();
    let port = config.port;

    tracing::info!(
        db_path = %config.db_path.display(),
        chunk_size = config.chunk_size,
        litestream = config.litestream,
        stats = config.enable_stats,
        health = config.enable_health,
        "Opening record store"
    );

    let state = AppState::open(config)?;
    stats::spawn_window_reset(state.stats.clone());

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Uploader server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Uploader server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
