//! Transfer tuning: strategy threshold, per-call deadlines, reaper queue size.

use std::time::Duration;

use coffer_core::defaults::{self, env_parse};

const MIB: usize = 1024 * 1024;

/// Configuration for the coordinators and the blob reaper.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Objects at or below this size are written with a single `put`.
    pub multipart_threshold: usize,
    /// Deadline for each metadata store call.
    pub metadata_timeout: Duration,
    /// Fixed part of the blob write deadline.
    pub blob_timeout_base: Duration,
    /// Added to the blob write deadline per started MiB.
    pub blob_timeout_per_mib: Duration,
    /// Deadline for each deferred blob delete.
    pub blob_delete_timeout: Duration,
    /// Deletes buffered by the reaper before new ones are dropped.
    pub reaper_capacity: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: defaults::MULTIPART_THRESHOLD_BYTES,
            metadata_timeout: Duration::from_millis(defaults::METADATA_TIMEOUT_MS),
            blob_timeout_base: Duration::from_millis(defaults::BLOB_TIMEOUT_BASE_MS),
            blob_timeout_per_mib: Duration::from_millis(defaults::BLOB_TIMEOUT_PER_MIB_MS),
            blob_delete_timeout: Duration::from_millis(defaults::BLOB_DELETE_TIMEOUT_MS),
            reaper_capacity: defaults::REAPER_QUEUE_CAPACITY,
        }
    }
}

impl TransferConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `COFFER_MULTIPART_THRESHOLD_BYTES` | `5242880` |
    /// | `COFFER_METADATA_TIMEOUT_MS` | `2000` |
    /// | `COFFER_BLOB_TIMEOUT_BASE_MS` | `10000` |
    /// | `COFFER_BLOB_TIMEOUT_PER_MIB_MS` | `1000` |
    /// | `COFFER_BLOB_DELETE_TIMEOUT_MS` | `10000` |
    /// | `COFFER_REAPER_QUEUE_CAPACITY` | `1024` |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            multipart_threshold: env_parse(
                defaults::ENV_MULTIPART_THRESHOLD_BYTES,
                base.multipart_threshold,
            ),
            metadata_timeout: Duration::from_millis(env_parse(
                defaults::ENV_METADATA_TIMEOUT_MS,
                defaults::METADATA_TIMEOUT_MS,
            )),
            blob_timeout_base: Duration::from_millis(env_parse(
                defaults::ENV_BLOB_TIMEOUT_BASE_MS,
                defaults::BLOB_TIMEOUT_BASE_MS,
            )),
            blob_timeout_per_mib: Duration::from_millis(env_parse(
                defaults::ENV_BLOB_TIMEOUT_PER_MIB_MS,
                defaults::BLOB_TIMEOUT_PER_MIB_MS,
            )),
            blob_delete_timeout: Duration::from_millis(env_parse(
                defaults::ENV_BLOB_DELETE_TIMEOUT_MS,
                defaults::BLOB_DELETE_TIMEOUT_MS,
            )),
            reaper_capacity: env_parse(defaults::ENV_REAPER_QUEUE_CAPACITY, base.reaper_capacity)
                .max(1),
        }
    }

    pub fn with_multipart_threshold(mut self, bytes: usize) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Set both parts of the blob write deadline.
    pub fn with_blob_timeout(mut self, base: Duration, per_mib: Duration) -> Self {
        self.blob_timeout_base = base;
        self.blob_timeout_per_mib = per_mib;
        self
    }

    pub fn with_blob_delete_timeout(mut self, timeout: Duration) -> Self {
        self.blob_delete_timeout = timeout;
        self
    }

    pub fn with_reaper_capacity(mut self, capacity: usize) -> Self {
        self.reaper_capacity = capacity.max(1);
        self
    }

    /// Deadline for writing an object of `size` bytes.
    pub fn blob_write_timeout(&self, size: usize) -> Duration {
        let started_mib = size.div_ceil(MIB) as u32;
        self.blob_timeout_base + self.blob_timeout_per_mib * started_mib
    }
}
