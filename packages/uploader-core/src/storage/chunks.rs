//! Chunk-level access used by the writer and reader.
//!
//! The writer only ever needs to insert a row and the reader only ever
//! needs to look rows up, so each gets a narrow capability trait instead of
//! the whole connection. [`SqliteChunks`] implements both over the store's
//! shared connection; tests substitute in-memory doubles.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::types::RecordId;

/// Insert-only access to the chunk table
pub trait ChunkSink {
    /// Store one chunk row under `(id, index)`
    fn insert_chunk(&self, id: &RecordId, index: u64, chunk: &[u8]) -> Result<()>;
}

/// Read-only access to the chunk table.
///
/// Two lookups because opening a reader needs the file length (first and
/// last rows) before any content, while reads fetch one row at a time.
pub trait ChunkSource {
    /// Describe the stored chunks of `id`, or `None` if it has no rows
    fn chunk_extent(&self, id: &RecordId) -> Result<Option<ChunkExtent>>;

    /// Fetch the chunk at `index`, or `None` if that row does not exist
    fn fetch_chunk(&self, id: &RecordId, index: u64) -> Result<Option<Vec<u8>>>;
}

/// Shape of a record's chunk sequence.
///
/// The chunk size is inferred from the first row; every row but the last
/// has exactly that length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkExtent {
    /// Length of the first chunk row
    pub chunk_size: u64,
    /// Highest chunk index
    pub last_index: u64,
    /// Length of the chunk at `last_index`
    pub last_len: u64,
}

impl ChunkExtent {
    /// Total content length: `chunk_size * last_index + last_len`
    pub fn file_length(&self) -> u64 {
        self.chunk_size * self.last_index + self.last_len
    }
}

impl<T: ChunkSink + ?Sized> ChunkSink for &T {
    fn insert_chunk(&self, id: &RecordId, index: u64, chunk: &[u8]) -> Result<()> {
        (**self).insert_chunk(id, index, chunk)
    }
}

impl<T: ChunkSource + ?Sized> ChunkSource for &T {
    fn chunk_extent(&self, id: &RecordId) -> Result<Option<ChunkExtent>> {
        (**self).chunk_extent(id)
    }

    fn fetch_chunk(&self, id: &RecordId, index: u64) -> Result<Option<Vec<u8>>> {
        (**self).fetch_chunk(id, index)
    }
}

// ============================================================================
// SQLITE IMPLEMENTATION
// ============================================================================

/// Chunk table access over the store's shared connection.
///
/// Each call holds the connection lock for a single statement.
#[derive(Clone)]
pub struct SqliteChunks {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChunks {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

fn to_sql_index(index: u64) -> Result<i64> {
    i64::try_from(index).map_err(|_| Error::Corrupted(format!("chunk index {} out of range", index)))
}

fn from_sql_len(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Corrupted(format!("negative {}: {}", what, value)))
}

impl ChunkSink for SqliteChunks {
    fn insert_chunk(&self, id: &RecordId, index: u64, chunk: &[u8]) -> Result<()> {
        let index = to_sql_index(index)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records_data (id, chunk_index, chunk) VALUES (?, ?, ?)",
            params![id.as_str(), index, chunk],
        )
        .map_err(|e| Error::Database(format!("Failed to insert chunk {} of {}: {}", index, id, e)))?;
        Ok(())
    }
}

impl ChunkSource for SqliteChunks {
    fn chunk_extent(&self, id: &RecordId) -> Result<Option<ChunkExtent>> {
        let first = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT LENGTH(chunk) FROM records_data
                 WHERE id = ? ORDER BY chunk_index ASC LIMIT 1",
                params![id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to read chunk size of {}: {}", id, e)))?
        };

        let Some(chunk_size) = first else {
            return Ok(None);
        };

        let last = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT chunk_index, LENGTH(chunk) FROM records_data
                 WHERE id = ? ORDER BY chunk_index DESC LIMIT 1",
                params![id.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to read length of {}: {}", id, e)))?
        };

        // Rows deleted between the two statements
        let Some((last_index, last_len)) = last else {
            return Ok(None);
        };

        let extent = ChunkExtent {
            chunk_size: from_sql_len(chunk_size, "chunk size")?,
            last_index: from_sql_len(last_index, "chunk index")?,
            last_len: from_sql_len(last_len, "chunk length")?,
        };

        if extent.chunk_size == 0 {
            return Err(Error::Corrupted(format!("record {} has an empty first chunk", id)));
        }

        Ok(Some(extent))
    }

    fn fetch_chunk(&self, id: &RecordId, index: u64) -> Result<Option<Vec<u8>>> {
        let sql_index = to_sql_index(index)?;
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT chunk FROM records_data WHERE id = ? AND chunk_index = ?",
            params![id.as_str(), sql_index],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("Failed to read chunk {} of {}: {}", index, id, e)))
    }
}
