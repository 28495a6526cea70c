//! # coffer-core
//!
//! Core types, store contracts, and the error taxonomy for coffer.
//!
//! This crate has no I/O of its own. Concrete stores live in `coffer-db`,
//! the upload/update coordinators in `coffer-files`, and the retention
//! sweeper in `coffer-jobs`.
//!
//! ## Log levels
//!
//! - `ERROR`: a store call failed outright and nothing was written
//! - `WARN`: recoverable inconsistency, naming the orphan row or blob
//! - `INFO`: completed operations, with record id and blob key
//! - `DEBUG`: strategy choice and key derivation
//!
//! Every event carries `subsystem`, `component` and `op` fields.

pub mod defaults;
pub mod error;
pub mod keys;
pub mod models;
pub mod naming;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{BlobError, Error, Leg, Orphan, Result, StoreError};
pub use keys::{unique_nanos, BlobKey, KeyScheme};
pub use models::*;
pub use naming::{infer_mime_type, sanitize_key_segment};
pub use traits::*;
