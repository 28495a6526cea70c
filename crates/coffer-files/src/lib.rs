//! # coffer-files
//!
//! Coordinates writes across the blob store and the metadata store.
//!
//! - [`UploadCoordinator`]: concurrent blob write + metadata insert
//! - [`UpdateCoordinator`]: blob-first replacement with deferred cleanup
//! - [`FileService`]: the two coordinators plus deactivate and reads
//! - [`BlobReaper`]: owned, bounded queue of superseded-blob deletes
//!
//! ## Example
//!
//! ```rust,ignore
//! use coffer_files::{FileService, TransferConfig};
//!
//! let service = FileService::new(blobs, meta, KeyScheme::from_env(), TransferConfig::from_env());
//! let id = service.upload(FileUpload::new("report.pdf", bytes)).await?;
//! ```

pub mod config;
pub mod reaper;
pub mod service;
pub mod transfer;
pub mod update;
pub mod upload;

pub use config::TransferConfig;
pub use reaper::BlobReaper;
pub use service::FileService;
pub use transfer::UploadStrategy;
pub use update::{UpdateCoordinator, UpdateOutcome};
pub use upload::UploadCoordinator;
