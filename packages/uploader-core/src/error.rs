//! # Error Handling
//!
//! Error types for the chunked record store.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Lookup Errors                                                     │
//! │  │   ├── NotFound              - No metadata row for the record id     │
//! │  │   └── AlreadyExists         - Insert under an id already in use     │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── Database              - Underlying SQLite failure             │
//! │  │   ├── ChunkMissing          - Gap in a record's chunk sequence      │
//! │  │   ├── Corrupted             - Stored values violate invariants      │
//! │  │   └── InvalidTimestamp      - created_at column is unparsable       │
//! │  │                                                                      │
//! │  ├── Schema Errors (startup-fatal)                                     │
//! │  │   ├── Migration             - Script or version bump failed         │
//! │  │   ├── InvalidMigrationName  - Name lacks a 3-digit prefix           │
//! │  │   └── DuplicateMigration    - Two scripts share a version           │
//! │  │                                                                      │
//! │  └── Stream Errors                                                     │
//! │      ├── Stream                - Caller-supplied stream failed         │
//! │      ├── InvalidChunkSize      - Chunk size of zero                    │
//! │      ├── InvalidWhence         - Unrecognized seek origin              │
//! │      └── InvalidSeek           - Seek before the start of the record   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The writer and reader also implement the `std::io` traits, so an
//! [`Error`] can travel through an [`std::io::Error`] and be recovered on
//! the other side with `Error::from`.

use std::io;

use thiserror::Error;

use crate::types::RecordId;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the record store
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// The record has no metadata row
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// Insert under an id that already has metadata or chunk rows
    #[error("Record already exists: {0}")]
    AlreadyExists(RecordId),

    // ========================================================================
    // Storage Errors
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// A chunk inside the record's extent could not be fetched
    #[error("Chunk {index} of record {id} is missing")]
    ChunkMissing {
        /// Record the chunk belongs to
        id: RecordId,
        /// Index that was requested
        index: u64,
    },

    /// Data corruption detected
    #[error("Data corruption detected: {0}")]
    Corrupted(String),

    /// A stored timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    // ========================================================================
    // Schema Errors
    // ========================================================================

    /// A migration script failed to apply
    #[error("Migration {version} failed: {reason}")]
    Migration {
        /// Version of the script that failed
        version: u32,
        /// Underlying failure
        reason: String,
    },

    /// A migration name does not start with a 3-digit version
    #[error("Invalid migration name: {0}")]
    InvalidMigrationName(String),

    /// Two migration scripts carry the same version
    #[error("Duplicate migration version: {0}")]
    DuplicateMigration(u32),

    // ========================================================================
    // Stream Errors
    // ========================================================================

    /// Content stream failure
    #[error("Stream error: {0}")]
    Stream(String),

    /// Chunk size must be positive
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Unrecognized seek origin
    #[error("Invalid whence value: {0}")]
    InvalidWhence(i32),

    /// Seek resolved to a negative position
    #[error("Invalid seek: {0}")]
    InvalidSeek(String),
}

impl Error {
    /// Whether this error means the record id is unknown
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether this error means the record id is already taken
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Whether this error came from bringing the schema up to date.
    ///
    /// Schema failures are fatal at startup: the store must not serve
    /// traffic against a partially migrated database.
    pub fn is_schema_failure(&self) -> bool {
        matches!(
            self,
            Error::Migration { .. } | Error::InvalidMigrationName(_) | Error::DuplicateMigration(_)
        )
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::other(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let message = err.to_string();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<Error>() {
                Ok(original) => *original,
                Err(other) => Error::Stream(other.to_string()),
            },
            None => Error::Stream(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_checkable() {
        let err = Error::NotFound(RecordId::from("abc"));
        assert!(err.is_not_found());
        assert!(!err.is_schema_failure());
        assert_eq!(err.to_string(), "Record not found: abc");
    }

    #[test]
    fn test_conflict_is_checkable() {
        let err = Error::AlreadyExists(RecordId::from("abc"));
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Record already exists: abc");
    }

    #[test]
    fn test_schema_failures() {
        assert!(Error::DuplicateMigration(1).is_schema_failure());
        assert!(Error::InvalidMigrationName("x.sql".into()).is_schema_failure());
        assert!(Error::Migration { version: 2, reason: "boom".into() }.is_schema_failure());
        assert!(!Error::Database("locked".into()).is_schema_failure());
    }

    #[test]
    fn test_error_survives_io_round_trip() {
        let io_err: io::Error = Error::InvalidWhence(7).into();
        match Error::from(io_err) {
            Error::InvalidWhence(7) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_error_becomes_stream_error() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "client went away");
        match Error::from(io_err) {
            Error::Stream(msg) => assert!(msg.contains("client went away")),
            other => panic!("unexpected error: {other:?}"),
        }

        let bare: io::Error = io::ErrorKind::UnexpectedEof.into();
        assert!(matches!(Error::from(bare), Error::Stream(_)));
    }
}
