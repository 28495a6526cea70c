//! Centralized default constants for coffer.
//!
//! Every crate reads its defaults from here so a value is tuned in one place.

// =============================================================================
// TRANSFER
// =============================================================================

/// Objects at or below this size use a single-shot put; larger ones go multipart.
pub const MULTIPART_THRESHOLD_BYTES: usize = 5 * 1024 * 1024;

/// Part size for multipart writes.
pub const MULTIPART_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum parts in flight during a multipart write.
pub const MULTIPART_MAX_CONCURRENCY: usize = 8;

/// Deadline for a single metadata store call.
pub const METADATA_TIMEOUT_MS: u64 = 2_000;

/// Fixed part of the blob write deadline.
pub const BLOB_TIMEOUT_BASE_MS: u64 = 10_000;

/// Size-proportional part of the blob write deadline, per started MiB.
pub const BLOB_TIMEOUT_PER_MIB_MS: u64 = 1_000;

/// Deadline for deleting a superseded or reclaimed blob.
pub const BLOB_DELETE_TIMEOUT_MS: u64 = 10_000;

/// Pending old-blob deletions buffered before new ones are dropped.
pub const REAPER_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// BLOB NAMESPACE
// =============================================================================

/// Default bucket name.
pub const S3_BUCKET: &str = "dropbox_files";

/// Default bucket region.
pub const S3_REGION: &str = "ap-south-1";

/// Default directory for the filesystem blob backend.
pub const FILE_STORAGE_PATH: &str = "/var/lib/coffer/blobs";

/// Key stem used when an upload carries no filename.
pub const EMPTY_FILENAME_STEM: &str = "file";

// =============================================================================
// RETENTION SWEEP
// =============================================================================

/// Days a record stays inactive before its blob is reclaimed.
pub const SWEEP_RETENTION_DAYS: i64 = 30;

/// Upper bound on the retention window (about 100 years).
pub const SWEEP_MAX_RETENTION_DAYS: i64 = 36_500;

/// Interval between scheduled sweeps (once a day).
pub const SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8081;

/// Request body ceiling in bytes (100 MiB).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/coffer";

// =============================================================================
// DATABASE POOL
// =============================================================================

pub const DB_MAX_CONNECTIONS: u32 = 10;
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait for a pooled connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an idle connection is kept.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Seconds before a connection is recycled.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_MULTIPART_THRESHOLD_BYTES: &str = "COFFER_MULTIPART_THRESHOLD_BYTES";
pub const ENV_MULTIPART_PART_SIZE_BYTES: &str = "COFFER_MULTIPART_PART_SIZE_BYTES";
pub const ENV_METADATA_TIMEOUT_MS: &str = "COFFER_METADATA_TIMEOUT_MS";
pub const ENV_BLOB_TIMEOUT_BASE_MS: &str = "COFFER_BLOB_TIMEOUT_BASE_MS";
pub const ENV_BLOB_TIMEOUT_PER_MIB_MS: &str = "COFFER_BLOB_TIMEOUT_PER_MIB_MS";
pub const ENV_BLOB_DELETE_TIMEOUT_MS: &str = "COFFER_BLOB_DELETE_TIMEOUT_MS";
pub const ENV_REAPER_QUEUE_CAPACITY: &str = "COFFER_REAPER_QUEUE_CAPACITY";
pub const ENV_BLOB_BACKEND: &str = "COFFER_BLOB_BACKEND";
pub const ENV_BLOB_LOCATOR_BASE: &str = "COFFER_BLOB_LOCATOR_BASE";
pub const ENV_FILE_STORAGE_PATH: &str = "FILE_STORAGE_PATH";
pub const ENV_S3_BUCKET: &str = "S3_BUCKET";
pub const ENV_S3_REGION: &str = "S3_REGION";
pub const ENV_S3_ENDPOINT: &str = "S3_ENDPOINT";
pub const ENV_MAX_UPLOAD_BYTES: &str = "COFFER_MAX_UPLOAD_BYTES";
pub const ENV_SWEEP_ENABLED: &str = "COFFER_SWEEP_ENABLED";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "COFFER_SWEEP_INTERVAL_SECS";
pub const ENV_SWEEP_RETENTION_DAYS: &str = "COFFER_SWEEP_RETENTION_DAYS";
pub const ENV_DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";
pub const ENV_DB_MIN_CONNECTIONS: &str = "DB_MIN_CONNECTIONS";

/// Read an environment variable, treating unset and blank values alike.
pub fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, falling back to `default` when it
/// is unset, blank, or unparsable.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_value(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_five_mebibytes() {
        assert_eq!(MULTIPART_THRESHOLD_BYTES, 5_242_880);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("COFFER_TEST_ENV_PARSE_GARBAGE", "not-a-number");
        assert_eq!(env_parse("COFFER_TEST_ENV_PARSE_GARBAGE", 7u64), 7);
        std::env::remove_var("COFFER_TEST_ENV_PARSE_GARBAGE");
    }

    #[test]
    fn test_env_value_treats_blank_as_unset() {
        std::env::set_var("COFFER_TEST_ENV_VALUE_BLANK", "   ");
        assert_eq!(env_value("COFFER_TEST_ENV_VALUE_BLANK"), None);
        std::env::remove_var("COFFER_TEST_ENV_VALUE_BLANK");
    }
}
