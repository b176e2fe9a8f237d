//! # Uploader Core
//!
//! Chunked object store for the uploader service.
//!
//! Uploaded files are kept inside SQLite, split into bounded-size rows, and
//! streamed back out with random access (including seeks from the end)
//! without ever holding a whole file in memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          UPLOADER CORE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   HTTP layer (uploader-server)                                         │
//! │        │  byte stream + metadata           record id                   │
//! │        ▼                                       ▼                        │
//! │   ┌─────────────────────────────────────────────────────────────────┐  │
//! │   │                         RecordStore                             │  │
//! │   └──────┬─────────────────────────┬──────────────────────┬─────────┘  │
//! │          ▼                         ▼                      ▼            │
//! │     ChunkWriter               ChunkReader           SchemaMigrator     │
//! │     (stream → rows)           (rows → Read+Seek)    (once, at open)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::io::Read;
//! use uploader_core::{RecordMetadata, RecordStore, StoreConfig};
//!
//! # fn main() -> uploader_core::Result<()> {
//! let store = RecordStore::open(&StoreConfig {
//!     path: Some("data/database.db".into()),
//!     ..StoreConfig::default()
//! })?;
//!
//! let meta = RecordMetadata::new("a1b2c3d4e5".into(), "notes.txt", "", "text/plain");
//! store.insert(&b"hello"[..], &meta)?;
//!
//! let mut record = store.get(&meta.id)?;
//! let mut body = String::new();
//! record.content.read_to_string(&mut body)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use storage::{
    ChunkReader, ChunkWriter, RecordStore, SchemaMigrator, StoreConfig, Whence,
    DEFAULT_CHUNK_SIZE,
};
pub use types::{MetadataUpdate, RecordId, RecordMetadata, UploadRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
