//! Blob key derivation and locator resolution.
//!
//! A storage key is `<filename>_<nanoseconds>`. The record stores the key
//! resolved against the configured namespace (the locator), e.g.
//! `https://dropbox_files.s3.amazonaws.com/report.pdf_1760000000000000000`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;

use crate::defaults;
use crate::naming::sanitize_key_segment;

/// Last timestamp handed out by [`unique_nanos`].
static LAST_NANOS: Lazy<AtomicI64> = Lazy::new(|| AtomicI64::new(0));

/// Current Unix time in nanoseconds, strictly increasing across calls in
/// this process.
pub fn unique_nanos() -> i64 {
    let now = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1_000));
    let mut last = LAST_NANOS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_NANOS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Storage key and locator for one blob write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobKey {
    /// Key handed to the blob store.
    pub key: String,
    /// Value stored in the record's `blob_key` column.
    pub locator: String,
}

/// Maps storage keys to locators within one bucket/namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    base: String,
}

impl KeyScheme {
    /// Scheme whose locators start with `base` (a trailing `/` is ignored).
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Public S3 URL style used by default: `https://{bucket}.s3.amazonaws.com`.
    pub fn for_bucket(bucket: &str) -> Self {
        Self::new(format!("https://{}.s3.amazonaws.com", bucket))
    }

    /// Build from `COFFER_BLOB_LOCATOR_BASE`, else from `S3_BUCKET`.
    pub fn from_env() -> Self {
        match defaults::env_value(defaults::ENV_BLOB_LOCATOR_BASE) {
            Some(base) => Self::new(base),
            None => {
                let bucket = defaults::env_value(defaults::ENV_S3_BUCKET)
                    .unwrap_or_else(|| defaults::S3_BUCKET.to_string());
                Self::for_bucket(&bucket)
            }
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Derive a fresh, process-unique key for `filename`.
    pub fn derive(&self, filename: &str) -> BlobKey {
        let key = format!("{}_{}", sanitize_key_segment(filename), unique_nanos());
        let locator = self.resolve(&key);
        BlobKey { key, locator }
    }

    /// Locator for a storage key.
    pub fn resolve(&self, key: &str) -> String {
        format!("{}/{}", self.base, key)
    }

    /// Storage key for a locator.
    ///
    /// Locators written under another namespace are returned unchanged, which
    /// matches records that stored a bare key.
    pub fn key_of<'a>(&self, locator: &'a str) -> &'a str {
        locator
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(locator)
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::for_bucket(defaults::S3_BUCKET)
    }
}
