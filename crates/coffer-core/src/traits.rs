//! Store contracts consumed by the coordinators and the sweeper.
//!
//! Implementations must be safe to share across request tasks; any locking
//! the underlying storage needs happens inside the implementation.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{BlobError, StoreError};
use crate::models::{FileRecord, FileUpdate, NewFileRecord};

/// Key-addressable durable object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` in a single request.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError>;

    /// Store `data` under `key` as a sequence of parts.
    async fn put_multipart(&self, key: &str, data: Bytes) -> Result<(), BlobError>;

    /// Remove the object at `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Check whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
}

/// Relational storage of file records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new active record and return its id.
    async fn insert(&self, record: NewFileRecord) -> Result<i64, StoreError>;

    /// Overwrite the content fields of an active record.
    ///
    /// Returns the number of rows matched. Zero means the record was absent or
    /// inactive; that is a warning for the caller, not an error.
    async fn update(&self, id: i64, fields: FileUpdate) -> Result<u64, StoreError>;

    /// Fetch a record regardless of its status.
    async fn get(&self, id: i64) -> Result<Option<FileRecord>, StoreError>;

    /// Mark a record inactive.
    ///
    /// Fails with [`StoreError::NotFound`] if no such record exists; succeeds
    /// without change if it is already inactive.
    async fn soft_delete(&self, id: i64) -> Result<(), StoreError>;

    /// Inactive records deactivated before `before` whose blob has not been
    /// reclaimed yet, ordered by id.
    async fn list_inactive(&self, before: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError>;

    /// Whether an active record with this id exists.
    async fn exists(&self, id: i64) -> Result<bool, StoreError>;

    /// All active records, ordered by id.
    async fn list_active(&self) -> Result<Vec<FileRecord>, StoreError>;

    /// Record that the blob of an inactive record has been deleted.
    async fn mark_reclaimed(&self, id: i64) -> Result<(), StoreError>;
}
