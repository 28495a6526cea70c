//! Strategy selection and deadline-bounded store calls shared by the
//! coordinators.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tracing::debug;

use coffer_core::{BlobError, BlobStore, StoreError};

/// How an object is written to the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    SingleShot,
    Multipart,
}

impl UploadStrategy {
    /// `size <= threshold` is single-shot; anything larger is multipart.
    pub fn for_size(size: usize, threshold: usize) -> Self {
        if size <= threshold {
            UploadStrategy::SingleShot
        } else {
            UploadStrategy::Multipart
        }
    }
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStrategy::SingleShot => f.write_str("single_shot"),
            UploadStrategy::Multipart => f.write_str("multipart"),
        }
    }
}

/// Run a blob call, failing with [`BlobError::Timeout`] past `limit`.
pub(crate) async fn with_blob_deadline<T, F>(limit: Duration, call: F) -> Result<T, BlobError>
where
    F: Future<Output = Result<T, BlobError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BlobError::Timeout(limit)),
    }
}

/// Run a metadata call, failing with [`StoreError::Timeout`] past `limit`.
pub(crate) async fn with_metadata_deadline<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Write `data` under `key` with the given strategy and deadline.
pub(crate) async fn write_blob(
    blobs: &dyn BlobStore,
    strategy: UploadStrategy,
    key: &str,
    data: Bytes,
    limit: Duration,
) -> Result<(), BlobError> {
    debug!(
        subsystem = "files",
        component = "transfer",
        op = "write_blob",
        blob_key = %key,
        size_bytes = data.len(),
        strategy = %strategy,
        timeout_ms = limit.as_millis() as u64,
        "Writing blob"
    );
    match strategy {
        UploadStrategy::SingleShot => with_blob_deadline(limit, blobs.put(key, data)).await,
        UploadStrategy::Multipart => with_blob_deadline(limit, blobs.put_multipart(key, data)).await,
    }
}
