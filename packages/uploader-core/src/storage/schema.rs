//! # Database Schema
//!
//! Embedded migration scripts for the record store.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐              ┌─────────────────┐                   │
//! │  │    records      │              │  records_data   │                   │
//! │  ├─────────────────┤              ├─────────────────┤                   │
//! │  │ id          PK  │◄─────────────│ id              │                   │
//! │  │ filename        │              │ chunk_index     │  PK(id, index)    │
//! │  │ note            │              │ chunk     BLOB  │                   │
//! │  │ content_type    │              └─────────────────┘                   │
//! │  │ created_at      │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  PRAGMA user_version  ──  highest migration applied                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scripts are named `NNN-description.sql`; the leading three digits are the
//! version. New scripts must only ever be appended.

/// `(name, sql)` pairs compiled into the binary
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001-create-records.sql",
        include_str!("../../migrations/001-create-records.sql"),
    ),
    (
        "002-create-records-data.sql",
        include_str!("../../migrations/002-create-records-data.sql"),
    ),
];
