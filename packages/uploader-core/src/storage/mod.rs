//! # Storage Module
//!
//! SQLite-backed chunked object storage.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  RecordStore  (store.rs)                                        │   │
//! │  │  insert / get / get_metadata / update_metadata / delete         │   │
//! │  └───────┬──────────────────────┬───────────────────────┬──────────┘   │
//! │          │ ChunkSink            │ ChunkSource           │ startup      │
//! │          ▼                      ▼                       ▼              │
//! │  ┌───────────────┐     ┌────────────────┐     ┌──────────────────┐    │
//! │  │  ChunkWriter  │     │  ChunkReader   │     │  SchemaMigrator  │    │
//! │  │  (writer.rs)  │     │  (reader.rs)   │     │  (migrator.rs)   │    │
//! │  └───────┬───────┘     └───────┬────────┘     └────────┬─────────┘    │
//! │          │                     │                       │              │
//! │          ▼                     ▼                       ▼              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite:  records  │  records_data  │  PRAGMA user_version      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The writer and reader never see the connection itself, only the narrow
//! capabilities in [`chunks`].

mod chunks;
mod migrator;
mod reader;
pub mod schema;
mod store;
mod writer;

pub use chunks::{ChunkExtent, ChunkSink, ChunkSource, SqliteChunks};
pub use migrator::{Migration, SchemaMigrator};
pub use reader::{ChunkReader, Whence};
pub use store::{RecordStore, StoreConfig, BUSY_TIMEOUT, DEFAULT_CHUNK_SIZE};
pub use writer::ChunkWriter;
