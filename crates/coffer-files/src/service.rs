//! File operations exposed to the transport layer.

use std::sync::Arc;

use tracing::info;

use coffer_core::{
    BlobStore, Error, FileRecord, FileUpload, KeyScheme, MetadataStore, Result, StoreError,
};

use crate::config::TransferConfig;
use crate::reaper::BlobReaper;
use crate::transfer::with_metadata_deadline;
use crate::update::{UpdateCoordinator, UpdateOutcome};
use crate::upload::UploadCoordinator;

fn validate_id(id: i64) -> Result<()> {
    if id <= 0 {
        return Err(Error::Validation(format!(
            "file id must be positive, got {}",
            id
        )));
    }
    Ok(())
}

/// Entry point for upload, update, deactivate and reads.
///
/// Owns the blob reaper; call [`FileService::shutdown`] before exiting so
/// queued deletes are attempted.
pub struct FileService {
    meta: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    keys: KeyScheme,
    config: TransferConfig,
    uploads: UploadCoordinator,
    updates: UpdateCoordinator,
    reaper: Arc<BlobReaper>,
}

impl FileService {
    /// Build the service and start its reaper. Must be called inside a tokio
    /// runtime.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        keys: KeyScheme,
        config: TransferConfig,
    ) -> Self {
        let reaper = Arc::new(BlobReaper::spawn(
            blobs.clone(),
            config.reaper_capacity,
            config.blob_delete_timeout,
        ));
        Self {
            uploads: UploadCoordinator::new(
                blobs.clone(),
                meta.clone(),
                keys.clone(),
                config.clone(),
            ),
            updates: UpdateCoordinator::new(
                blobs.clone(),
                meta.clone(),
                reaper.clone(),
                keys.clone(),
                config.clone(),
            ),
            meta,
            blobs,
            keys,
            config,
            reaper,
        }
    }

    pub async fn upload(&self, upload: FileUpload) -> Result<i64> {
        self.uploads.upload(upload).await
    }

    pub async fn update(&self, id: i64, upload: FileUpload) -> Result<UpdateOutcome> {
        self.updates.update(id, upload).await
    }

    /// Soft-delete a record. Repeating it is a no-op; the blob is untouched.
    pub async fn deactivate(&self, id: i64) -> Result<()> {
        validate_id(id)?;
        match with_metadata_deadline(self.config.metadata_timeout, self.meta.soft_delete(id)).await
        {
            Ok(()) => {
                info!(
                    subsystem = "files",
                    component = "service",
                    op = "deactivate",
                    file_id = id,
                    "File deactivated"
                );
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(Error::NotFound(format!("file {}", id))),
            Err(e) => Err(Error::MetadataWrite(e)),
        }
    }

    /// Fetch an active record.
    pub async fn get(&self, id: i64) -> Result<FileRecord> {
        validate_id(id)?;
        let record = with_metadata_deadline(self.config.metadata_timeout, self.meta.get(id))
            .await
            .map_err(Error::MetadataRead)?;
        match record {
            Some(record) if record.is_active() => Ok(record),
            _ => Err(Error::NotFound(format!("file {}", id))),
        }
    }

    /// All active records, ordered by id.
    pub async fn list(&self) -> Result<Vec<FileRecord>> {
        with_metadata_deadline(self.config.metadata_timeout, self.meta.list_active())
            .await
            .map_err(Error::MetadataRead)
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.meta
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Wait for every superseded-blob delete queued so far.
    pub async fn drain_reaper(&self) {
        self.reaper.drain().await;
    }

    /// Stop the reaper after it has handled what is queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.reaper.shutdown().await
    }
}
