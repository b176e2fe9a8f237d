//! Record types shared by the store and its callers.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{ChunkReader, SqliteChunks};

/// Opaque record identifier.
///
/// Assigned by the caller at creation and never reused. The store does not
/// interpret it; format checks belong to whoever mints ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Display metadata kept in the `records` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Record identifier
    pub id: RecordId,
    /// Original file name
    pub filename: String,
    /// Free-form note attached by the uploader
    pub note: String,
    /// MIME type reported at upload
    pub content_type: String,
    /// Creation time, immutable after insert
    pub created_at: DateTime<Utc>,
}

impl RecordMetadata {
    /// Metadata for a record created now
    pub fn new(
        id: RecordId,
        filename: impl Into<String>,
        note: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            note: note.into(),
            content_type: content_type.into(),
            // Stored with second precision, so drop the fraction up front
            created_at: truncate_to_seconds(Utc::now()),
        }
    }
}

/// Replacement values for the mutable metadata pair.
///
/// Filename and note are always replaced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    /// New file name
    pub filename: String,
    /// New note
    pub note: String,
}

/// A record returned by `RecordStore::get`
pub struct UploadRecord {
    /// The record's metadata row
    pub metadata: RecordMetadata,
    /// Seekable stream over the record's content
    pub content: ChunkReader<SqliteChunks>,
}

impl fmt::Debug for UploadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRecord")
            .field("metadata", &self.metadata)
            .field("content_length", &self.content.len())
            .finish()
    }
}

/// Render a timestamp the way the `created_at` column stores it
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a `created_at` column value
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{raw:?}: {e}")))
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
