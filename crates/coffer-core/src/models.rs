//! File record model shared by every crate.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Visibility state of a file record.
///
/// The transition is one-directional: nothing moves a record back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Visible and resolvable.
    Active,
    /// Soft-deleted, pending blob reclamation.
    Inactive,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(FileStatus::Active),
            "inactive" => Ok(FileStatus::Inactive),
            other => Err(StoreError::Corrupt(format!("unknown file status '{}'", other))),
        }
    }
}

/// Metadata row describing one stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    /// Display name supplied by the uploader.
    pub filename: String,
    pub size_bytes: i64,
    /// Locator of the object in the blob store.
    pub blob_key: String,
    /// Best-effort MIME type from the filename extension; may be empty.
    pub mime_type: String,
    pub description: String,
    #[serde(skip_serializing)]
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// First Active -> Inactive transition.
    #[serde(skip_serializing)]
    pub deactivated_at: Option<DateTime<Utc>>,
    /// When the sweeper deleted the blob of this inactive record.
    #[serde(skip_serializing)]
    pub blob_reclaimed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active
    }
}

/// Fields of a record to insert. The store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub filename: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub mime_type: String,
    pub description: String,
}

/// Fields overwritten when an active record's content is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub filename: String,
    pub size_bytes: i64,
    pub blob_key: String,
    pub mime_type: String,
    pub description: String,
}

impl From<NewFileRecord> for FileUpdate {
    fn from(r: NewFileRecord) -> Self {
        Self {
            filename: r.filename,
            size_bytes: r.size_bytes,
            blob_key: r.blob_key,
            mime_type: r.mime_type,
            description: r.description,
        }
    }
}

/// Incoming file content handed to the coordinators by the transport layer.
///
/// The transport enforces the request-size ceiling, so `data` is bounded.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub filename: String,
    pub description: Option<String>,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            description: None,
            data: data.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declared size of the object in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
