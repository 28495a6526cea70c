//! # coffer-jobs
//!
//! Background reclamation for coffer.
//!
//! This crate provides:
//! - [`RetentionSweeper`]: deletes blobs of records inactive past the
//!   retention window, at least once, never overlapping itself
//! - [`SweepScheduler`]: runs the sweeper periodically with a shutdown handle
//!
//! ## Example
//!
//! ```ignore
//! use coffer_jobs::{RetentionSweeper, SweepConfig, SweepScheduler};
//!
//! let sweeper = Arc::new(RetentionSweeper::new(blobs, meta, keys, SweepConfig::from_env()));
//! let handle = SweepScheduler::new(sweeper.clone()).start();
//!
//! // One-off run, e.g. from an admin endpoint
//! let report = sweeper.sweep().await?;
//!
//! handle.shutdown().await?;
//! ```

pub mod scheduler;
pub mod sweeper;

pub use scheduler::{SchedulerHandle, SweepEvent, SweepScheduler};
pub use sweeper::{RetentionSweeper, SweepConfig, SweepReport};
