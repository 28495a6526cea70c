//! Error types for coffer.
//!
//! Store implementations return [`BlobError`] or [`StoreError`]. The
//! coordinators wrap those, unchanged, in an [`Error`] variant that names the
//! leg that failed so callers can decide whether to retry.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using coffer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure talking to the blob store.
#[derive(Error, Debug)]
pub enum BlobError {
    /// Local filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote object store rejected or failed the request
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Key cannot be used as a storage path
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    /// Call exceeded its deadline
    #[error("Blob operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Store is unreachable or refused the operation
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

/// Failure talking to the metadata store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Row with the given id does not exist
    #[error("File record {0} not found")]
    NotFound(i64),

    /// Stored value could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Call exceeded its deadline
    #[error("Metadata operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Store is unreachable or refused the operation
    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),
}

/// One side of a dual write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Blob,
    Metadata,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Blob => f.write_str("blob"),
            Leg::Metadata => f.write_str("metadata"),
        }
    }
}

/// Side effect left behind when only one leg of a dual write landed.
///
/// When the failed leg timed out, the store may still have committed it
/// after the deadline, so the orphan is possible rather than certain. A timed
/// out metadata update, for example, may have repointed the record at the new
/// blob, leaving the previous blob unreferenced instead. See
/// [`Error::commit_unknown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Orphan {
    /// Metadata row whose blob was never written.
    Row(i64),
    /// Blob no metadata row references.
    Blob(String),
}

impl fmt::Display for Orphan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orphan::Row(id) => write!(f, "orphan row {}", id),
            Orphan::Blob(key) => write!(f, "orphan blob {}", key),
        }
    }
}

/// Core error type for coffer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid identifier or payload; not retryable
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Referenced record is absent, or inactive where an active one is required
    #[error("Not found: {0}")]
    NotFound(String),

    /// Writing the blob failed
    #[error("Blob write failed for {key}: {source}")]
    BlobWrite {
        key: String,
        #[source]
        source: BlobError,
    },

    /// Deleting a blob failed
    #[error("Blob delete failed for {key}: {source}")]
    BlobDelete {
        key: String,
        #[source]
        source: BlobError,
    },

    /// Writing to the metadata store failed
    #[error("Metadata write failed: {0}")]
    MetadataWrite(#[source] StoreError),

    /// Reading from the metadata store failed
    #[error("Metadata read failed: {0}")]
    MetadataRead(#[source] StoreError),

    /// One leg of a dual write landed and the other failed
    #[error("Partial failure: {landed} write landed, {failed} write failed ({orphan}): {cause}")]
    PartialFailure {
        landed: Leg,
        failed: Leg,
        orphan: Orphan,
        #[source]
        cause: Box<Error>,
    },

    /// Both legs of a dual write failed; nothing landed
    #[error("Blob write failed for {key}: {blob}; metadata write failed: {metadata}")]
    DualWrite {
        key: String,
        blob: BlobError,
        metadata: StoreError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The leg whose failure produced this error, if a store was involved.
    ///
    /// `DualWrite` reports the blob leg since that is the side a retry has to
    /// redo first.
    pub fn failed_leg(&self) -> Option<Leg> {
        match self {
            Error::BlobWrite { .. } | Error::BlobDelete { .. } | Error::DualWrite { .. } => {
                Some(Leg::Blob)
            }
            Error::MetadataWrite(_) | Error::MetadataRead(_) => Some(Leg::Metadata),
            Error::PartialFailure { failed, .. } => Some(*failed),
            _ => None,
        }
    }

    /// Whether the failed leg of a `PartialFailure` timed out, so its write
    /// may have committed anyway and the reported orphan is unconfirmed.
    pub fn commit_unknown(&self) -> bool {
        match self {
            Error::PartialFailure { cause, .. } => matches!(
                cause.as_ref(),
                Error::MetadataWrite(StoreError::Timeout(_))
                    | Error::BlobWrite {
                        source: BlobError::Timeout(_),
                        ..
                    }
            ),
            _ => false,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        self.failed_leg().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("id must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid input: id must be positive");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("file 42".to_string());
        assert_eq!(err.to_string(), "Not found: file 42");
    }

    #[test]
    fn test_blob_write_names_key_and_cause() {
        let err = Error::BlobWrite {
            key: "a.txt_1".to_string(),
            source: BlobError::Unavailable("bucket offline".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.txt_1"));
        assert!(msg.contains("bucket offline"));
        assert_eq!(err.failed_leg(), Some(Leg::Blob));
    }

    #[test]
    fn test_partial_failure_reports_failed_leg() {
        let err = Error::PartialFailure {
            landed: Leg::Metadata,
            failed: Leg::Blob,
            orphan: Orphan::Row(7),
            cause: Box::new(Error::BlobWrite {
                key: "k".to_string(),
                source: BlobError::Timeout(Duration::from_millis(1500)),
            }),
        };
        assert_eq!(err.failed_leg(), Some(Leg::Blob));
        assert!(err.commit_unknown());
        let msg = err.to_string();
        assert!(msg.contains("metadata write landed"));
        assert!(msg.contains("orphan row 7"));
        assert!(msg.contains("1500ms"));
    }

    #[test]
    fn test_metadata_errors_report_metadata_leg() {
        let err = Error::MetadataWrite(StoreError::Timeout(Duration::from_secs(2)));
        assert_eq!(err.failed_leg(), Some(Leg::Metadata));
        assert!(err.is_retryable());

        let err = Error::MetadataRead(StoreError::Unavailable("down".to_string()));
        assert_eq!(err.failed_leg(), Some(Leg::Metadata));
    }

    #[test]
    fn test_caller_errors_are_not_retryable() {
        assert!(!Error::Validation("x".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert_eq!(Error::Internal("x".into()).failed_leg(), None);
    }

    #[test]
    fn test_dual_write_mentions_both_causes() {
        let err = Error::DualWrite {
            key: "k_1".to_string(),
            blob: BlobError::ObjectStore("503".to_string()),
            metadata: StoreError::NotFound(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("File record 3 not found"));
    }

    #[test]
    fn test_source_chain_preserves_store_error() {
        use std::error::Error as _;

        let err = Error::MetadataWrite(StoreError::Corrupt("bad status".to_string()));
        let source = err.source().expect("wrapped store error");
        assert_eq!(source.to_string(), "Corrupt record: bad status");
    }

    #[test]
    fn test_blob_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: BlobError = io_err.into();
        assert!(matches!(err, BlobError::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_commit_unknown_only_for_timed_out_leg() {
        let timed_out = Error::PartialFailure {
            landed: Leg::Blob,
            failed: Leg::Metadata,
            orphan: Orphan::Blob("a.txt_1".to_string()),
            cause: Box::new(Error::MetadataWrite(StoreError::Timeout(Duration::from_millis(
                2000,
            )))),
        };
        let refused = Error::PartialFailure {
            landed: Leg::Blob,
            failed: Leg::Metadata,
            orphan: Orphan::Blob("a.txt_1".to_string()),
            cause: Box::new(Error::MetadataWrite(StoreError::Unavailable(
                "connection refused".to_string(),
            ))),
        };
        assert!(timed_out.commit_unknown());
        assert!(!refused.commit_unknown());
        assert!(!Error::MetadataWrite(StoreError::Timeout(Duration::from_millis(1))).commit_unknown());
    }
}
