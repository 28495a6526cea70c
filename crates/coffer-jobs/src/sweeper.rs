//! Retention sweep: reclaim blobs of records inactive past the retention window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{error, info, warn};

use coffer_core::defaults::{self, env_parse, env_value};
use coffer_core::{BlobError, BlobStore, Error, KeyScheme, MetadataStore, Result, StoreError};

/// Configuration for the sweeper and its scheduler.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Whether the scheduler runs sweeps at all.
    pub enabled: bool,
    /// Days a record stays inactive before its blob is reclaimed. 0 sweeps
    /// every inactive record.
    pub retention_days: i64,
    /// Time between scheduled sweeps.
    pub interval: Duration,
    pub metadata_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: defaults::SWEEP_RETENTION_DAYS,
            interval: Duration::from_secs(defaults::SWEEP_INTERVAL_SECS),
            metadata_timeout: Duration::from_millis(defaults::METADATA_TIMEOUT_MS),
            delete_timeout: Duration::from_millis(defaults::BLOB_DELETE_TIMEOUT_MS),
        }
    }
}

impl SweepConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `COFFER_SWEEP_ENABLED` | `true` | Run the periodic sweep |
    /// | `COFFER_SWEEP_INTERVAL_SECS` | `86400` | Time between sweeps |
    /// | `COFFER_SWEEP_RETENTION_DAYS` | `30` | Inactive age before reclamation, at most `36500` |
    /// | `COFFER_BLOB_DELETE_TIMEOUT_MS` | `10000` | Deadline for each blob delete |
    pub fn from_env() -> Self {
        let base = Self::default();
        let enabled = env_value(defaults::ENV_SWEEP_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        Self {
            enabled,
            retention_days: clamp_retention(env_parse(
                defaults::ENV_SWEEP_RETENTION_DAYS,
                base.retention_days,
            )),
            interval: Duration::from_secs(
                env_parse(defaults::ENV_SWEEP_INTERVAL_SECS, defaults::SWEEP_INTERVAL_SECS).max(1),
            ),
            metadata_timeout: Duration::from_millis(env_parse(
                defaults::ENV_METADATA_TIMEOUT_MS,
                defaults::METADATA_TIMEOUT_MS,
            )),
            delete_timeout: Duration::from_millis(env_parse(
                defaults::ENV_BLOB_DELETE_TIMEOUT_MS,
                defaults::BLOB_DELETE_TIMEOUT_MS,
            )),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = clamp_retention(days);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = timeout;
        self
    }
}

fn clamp_retention(days: i64) -> i64 {
    days.clamp(0, defaults::SWEEP_MAX_RETENTION_DAYS)
}

/// Start of the retention window, or `None` when it reaches past the
/// representable calendar and so can hold no records.
fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_days(retention_days).and_then(|window| now.checked_sub_signed(window))
}

/// Result of one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Inactive records past the retention window.
    pub candidates: usize,
    /// Candidates whose blob was deleted and whose row was marked reclaimed.
    pub reclaimed: usize,
    /// Candidates left for the next run.
    pub failed: usize,
    /// Another sweep was already running; nothing was done.
    pub skipped: bool,
    pub duration_ms: u64,
}

impl SweepReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Clears the running flag when a sweep ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reclaims blobs of long-inactive records. Rows are never deleted.
pub struct RetentionSweeper {
    blobs: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    keys: KeyScheme,
    config: SweepConfig,
    running: AtomicBool,
}

impl RetentionSweeper {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        keys: KeyScheme,
        config: SweepConfig,
    ) -> Self {
        Self {
            blobs,
            meta,
            keys,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Whether a sweep is in progress right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sweep.
    ///
    /// Returns a skipped report if another sweep is in progress. Fails only
    /// if the candidate list cannot be read; per-record failures are counted
    /// and retried on the next run.
    pub async fn sweep(&self) -> Result<SweepReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                subsystem = "jobs",
                component = "sweeper",
                op = "sweep",
                "Sweep already running, skipping"
            );
            return Ok(SweepReport::skipped());
        }
        let _guard = RunGuard(&self.running);
        let start = Instant::now();

        let Some(cutoff) = retention_cutoff(Utc::now(), self.config.retention_days) else {
            warn!(
                subsystem = "jobs",
                component = "sweeper",
                op = "sweep",
                retention_days = self.config.retention_days,
                "Retention window out of calendar range, nothing to sweep"
            );
            return Ok(SweepReport {
                duration_ms: start.elapsed().as_millis() as u64,
                ..SweepReport::default()
            });
        };
        let candidates = match timeout(self.config.metadata_timeout, self.meta.list_inactive(cutoff))
            .await
        {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => return Err(self.listing_failed(e)),
            Err(_) => return Err(self.listing_failed(StoreError::Timeout(self.config.metadata_timeout))),
        };

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for record in candidates {
            let key = self.keys.key_of(&record.blob_key);

            let deleted = match timeout(self.config.delete_timeout, self.blobs.delete(key)).await {
                Ok(result) => result,
                Err(_) => Err(BlobError::Timeout(self.config.delete_timeout)),
            };
            if let Err(source) = deleted {
                let e = Error::BlobDelete {
                    key: key.to_string(),
                    source,
                };
                warn!(
                    subsystem = "jobs",
                    component = "sweeper",
                    op = "delete_blob",
                    file_id = record.id,
                    blob_key = %key,
                    error = %e,
                    "Blob reclaim failed, will retry next sweep"
                );
                report.failed += 1;
                continue;
            }

            let marked = match timeout(self.config.metadata_timeout, self.meta.mark_reclaimed(record.id))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.config.metadata_timeout)),
            };
            if let Err(e) = marked {
                warn!(
                    subsystem = "jobs",
                    component = "sweeper",
                    op = "mark_reclaimed",
                    file_id = record.id,
                    blob_key = %key,
                    error = %e,
                    "Blob deleted but record not marked, will retry next sweep"
                );
                report.failed += 1;
                continue;
            }

            report.reclaimed += 1;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            subsystem = "jobs",
            component = "sweeper",
            op = "sweep",
            candidates = report.candidates,
            reclaimed = report.reclaimed,
            failed = report.failed,
            retention_days = self.config.retention_days,
            duration_ms = report.duration_ms,
            "Sweep complete"
        );
        Ok(report)
    }

    fn listing_failed(&self, e: StoreError) -> Error {
        error!(
            subsystem = "jobs",
            component = "sweeper",
            op = "list_inactive",
            error = %e,
            "Failed to list sweep candidates"
        );
        Error::MetadataRead(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-wide; every from_env case lives in this one test.
    #[test]
    fn test_config_from_env() {
        std::env::set_var(defaults::ENV_SWEEP_RETENTION_DAYS, "7");
        std::env::set_var(defaults::ENV_SWEEP_ENABLED, "false");
        std::env::set_var(defaults::ENV_BLOB_DELETE_TIMEOUT_MS, "2500");
        let config = SweepConfig::from_env();
        std::env::set_var(defaults::ENV_SWEEP_RETENTION_DAYS, "200000000");
        let oversized = SweepConfig::from_env();
        std::env::remove_var(defaults::ENV_SWEEP_RETENTION_DAYS);
        std::env::remove_var(defaults::ENV_SWEEP_ENABLED);
        std::env::remove_var(defaults::ENV_BLOB_DELETE_TIMEOUT_MS);

        assert_eq!(config.retention_days, 7);
        assert!(!config.enabled);
        assert_eq!(config.interval, Duration::from_secs(86_400));
        assert_eq!(config.delete_timeout, Duration::from_millis(2500));
        assert_eq!(oversized.retention_days, defaults::SWEEP_MAX_RETENTION_DAYS);
    }

    #[test]
    fn test_negative_retention_clamps_to_zero() {
        assert_eq!(SweepConfig::default().with_retention_days(-3).retention_days, 0);
    }

    #[test]
    fn test_oversized_retention_clamps_to_ceiling() {
        assert_eq!(
            SweepConfig::default()
                .with_retention_days(200_000_000)
                .retention_days,
            defaults::SWEEP_MAX_RETENTION_DAYS
        );
    }

    #[test]
    fn test_retention_cutoff_out_of_range_is_none() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, i64::MAX), None);
        assert_eq!(retention_cutoff(now, 200_000_000), None);
        assert_eq!(retention_cutoff(now, 0), Some(now));
        assert_eq!(
            retention_cutoff(now, 30),
            Some(now - chrono::Duration::days(30))
        );
    }

    #[test]
    fn test_run_guard_clears_flag() {
        let flag = AtomicBool::new(true);
        drop(RunGuard(&flag));
        assert!(!flag.load(Ordering::Acquire));
    }
}
