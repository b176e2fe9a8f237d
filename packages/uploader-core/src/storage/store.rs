//! # Record Store
//!
//! Complete records (content + metadata) on top of the chunk tables.
//!
//! ## Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RECORD OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  insert      id in use ──► AlreadyExists, nothing written          │
//! │              ChunkWriter over the stream ──► N chunk rows              │
//! │              then one `records` row                                    │
//! │              (not one transaction: a failure in between leaves         │
//! │               chunk rows with no metadata, see purge_orphaned_chunks)  │
//! │                                                                         │
//! │  get         `records` row ──► NotFound if absent                      │
//! │              ChunkReader over the chunk rows                           │
//! │                                                                         │
//! │  update      UPDATE filename, note ──► NotFound if 0 rows              │
//! │                                                                         │
//! │  delete      BEGIN                                                     │
//! │                DELETE FROM records      WHERE id = ?                   │
//! │                DELETE FROM records_data WHERE id = ?                   │
//! │              COMMIT           (unknown ids are a silent no-op)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::chunks::{ChunkSource, SqliteChunks};
use super::migrator::SchemaMigrator;
use super::reader::ChunkReader;
use super::schema;
use super::writer::ChunkWriter;
use crate::error::{Error, Result};
use crate::types::{
    format_timestamp, parse_timestamp, MetadataUpdate, RecordId, RecordMetadata, UploadRecord,
};

/// Default chunk size: 320 KB
pub const DEFAULT_CHUNK_SIZE: usize = 320 * 1024;

/// How long a writer waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Record store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database file (None = private in-memory database)
    pub path: Option<PathBuf>,
    /// Chunk size for new records
    pub chunk_size: usize,
    /// Pragmas for a database replicated by Litestream
    pub optimize_for_litestream: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            optimize_for_litestream: false,
        }
    }
}

/// Handle to the record store.
///
/// Cheap to clone; all clones share one connection, locked per statement.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    chunk_size: usize,
}

impl RecordStore {
    /// Open or create the store and bring its schema up to date.
    ///
    /// A schema failure here is fatal: the caller must not serve traffic.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::InvalidChunkSize(config.chunk_size));
        }

        let mut conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        Error::Database(format!("Failed to create {}: {}", parent.display(), e))
                    })?;
                }
                Connection::open(path)
                    .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?
            }
            None => Connection::open_in_memory().map_err(|e| {
                Error::Database(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Database(format!("Failed to set busy timeout: {}", e)))?;

        conn.execute_batch("PRAGMA temp_store = FILE; PRAGMA journal_mode = WAL;")
            .map_err(|e| Error::Database(format!("Failed to apply pragmas: {}", e)))?;

        if config.optimize_for_litestream {
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL; PRAGMA wal_autocheckpoint = 0;",
            )
            .map_err(|e| Error::Database(format!("Failed to apply Litestream pragmas: {}", e)))?;
        }

        let version = SchemaMigrator::new(schema::MIGRATIONS)?.run(&mut conn)?;

        tracing::info!(
            path = ?config.path,
            chunk_size = config.chunk_size,
            litestream = config.optimize_for_litestream,
            schema_version = version,
            "Record store opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            chunk_size: config.chunk_size,
        })
    }

    /// In-memory store, mostly for tests
    pub fn open_in_memory(chunk_size: usize) -> Result<Self> {
        Self::open(&StoreConfig {
            chunk_size,
            ..StoreConfig::default()
        })
    }

    /// Chunk size used for new records
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunks(&self) -> SqliteChunks {
        SqliteChunks::new(self.conn.clone())
    }

    // ========================================================================
    // RECORD OPERATIONS
    // ========================================================================

    /// Store `content` under `metadata.id`, then write the metadata row.
    ///
    /// Returns the number of content bytes stored. Zero-length content is
    /// valid and produces no chunk rows. An id that already has metadata or
    /// chunk rows is `AlreadyExists` and nothing is written.
    pub fn insert<R: Read>(&self, mut content: R, metadata: &RecordMetadata) -> Result<u64> {
        if self.id_in_use(&metadata.id)? {
            return Err(Error::AlreadyExists(metadata.id.clone()));
        }

        let mut writer = ChunkWriter::new(self.chunks(), metadata.id.clone(), self.chunk_size)?;
        io::copy(&mut content, &mut writer)?;
        let length = writer.close()?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records (id, filename, note, content_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                metadata.id.as_str(),
                metadata.filename,
                metadata.note,
                metadata.content_type,
                format_timestamp(&metadata.created_at),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert record {}: {}", metadata.id, e)))?;

        tracing::info!(id = metadata.id.as_str(), bytes = length, "Record stored");
        Ok(length)
    }

    fn id_in_use(&self, id: &RecordId) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1)
                 OR EXISTS(SELECT 1 FROM records_data WHERE id = ?1)",
            params![id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("Failed to check record {}: {}", id, e)))
    }

    /// Metadata plus a seekable stream over the content
    pub fn get(&self, id: &RecordId) -> Result<UploadRecord> {
        let metadata = self.get_metadata(id)?;

        let content = match ChunkReader::open(self.chunks(), id.clone()) {
            Ok(reader) => reader,
            // Metadata without chunk rows: empty content
            Err(Error::NotFound(_)) => ChunkReader::empty(self.chunks(), id.clone()),
            Err(e) => return Err(e),
        };

        Ok(UploadRecord { metadata, content })
    }

    /// Metadata only
    pub fn get_metadata(&self, id: &RecordId) -> Result<RecordMetadata> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT filename, note, content_type, created_at FROM records WHERE id = ?",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        );

        match result {
            Ok((filename, note, content_type, created_at)) => Ok(RecordMetadata {
                id: id.clone(),
                filename,
                note,
                content_type,
                created_at: parse_timestamp(&created_at)?,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(id.clone())),
            Err(e) => Err(Error::Database(format!("Failed to get record {}: {}", id, e))),
        }
    }

    /// Content length without opening a reader
    pub fn content_length(&self, id: &RecordId) -> Result<u64> {
        Ok(self
            .chunks()
            .chunk_extent(id)?
            .map(|extent| extent.file_length())
            .unwrap_or(0))
    }

    /// Replace filename and note.
    ///
    /// Fails with `NotFound` when no row was updated. Content is untouched.
    pub fn update_metadata(&self, id: &RecordId, update: &MetadataUpdate) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE records SET filename = ?, note = ? WHERE id = ?",
                params![update.filename, update.note, id.as_str()],
            )
            .map_err(|e| Error::Database(format!("Failed to update record {}: {}", id, e)))?;

        if rows == 0 {
            return Err(Error::NotFound(id.clone()));
        }

        tracing::debug!(id = id.as_str(), "Record metadata updated");
        Ok(())
    }

    /// Remove metadata and every chunk row in one transaction.
    ///
    /// Deleting an unknown id succeeds without doing anything.
    pub fn delete(&self, id: &RecordId) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin delete of {}: {}", id, e)))?;

        let records = tx
            .execute("DELETE FROM records WHERE id = ?", params![id.as_str()])
            .map_err(|e| Error::Database(format!("Failed to delete record {}: {}", id, e)))?;

        let chunks = tx
            .execute("DELETE FROM records_data WHERE id = ?", params![id.as_str()])
            .map_err(|e| Error::Database(format!("Failed to delete chunks of {}: {}", id, e)))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit delete of {}: {}", id, e)))?;

        if records > 0 || chunks > 0 {
            tracing::info!(id = id.as_str(), chunks, "Record deleted");
        }
        Ok(())
    }

    /// Delete chunk rows whose id has no metadata row.
    ///
    /// Reclaims space left by inserts that failed between the last chunk
    /// and the metadata row. Only safe while no insert is in flight, so it
    /// is meant to run once at startup.
    pub fn purge_orphaned_chunks(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let purged = conn
            .execute(
                "DELETE FROM records_data WHERE id NOT IN (SELECT id FROM records)",
                [],
            )
            .map_err(|e| Error::Database(format!("Failed to purge orphaned chunks: {}", e)))?;

        if purged > 0 {
            tracing::warn!(chunks = purged, "Purged orphaned chunk rows");
        }
        Ok(purged)
    }
}
