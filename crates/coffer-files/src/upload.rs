//! Upload coordination: blob write and metadata insert as one operation.
//!
//! Both legs run concurrently and are joined, never short-circuited, so the
//! outcome of each is known before the result is decided:
//!
//! | blob | metadata | result |
//! |------|----------|--------|
//! | ok | ok | `Ok(id)` |
//! | err | ok | `PartialFailure`, orphan row `id` |
//! | ok | err | `PartialFailure`, orphan blob `key` |
//! | err | err | `DualWrite` |
//!
//! A leg that failed by timing out may still commit after the deadline, so
//! its orphan is only possible. [`Error::commit_unknown`] reports that case
//! and the partial-failure log line carries it as `commit_unknown`.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use coffer_core::{
    infer_mime_type, BlobStore, Error, FileUpload, KeyScheme, Leg, MetadataStore, NewFileRecord,
    Orphan, Result,
};

use crate::config::TransferConfig;
use crate::transfer::{with_metadata_deadline, write_blob, UploadStrategy};

/// Writes new files to both stores.
pub struct UploadCoordinator {
    blobs: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    keys: KeyScheme,
    config: TransferConfig,
}

impl UploadCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        keys: KeyScheme,
        config: TransferConfig,
    ) -> Self {
        Self {
            blobs,
            meta,
            keys,
            config,
        }
    }

    /// Store a new file and return the id of its record.
    ///
    /// An id is only returned when both the blob and the record landed.
    pub async fn upload(&self, upload: FileUpload) -> Result<i64> {
        let start = Instant::now();
        let size = upload.size();
        let strategy = UploadStrategy::for_size(size, self.config.multipart_threshold);
        let blob_key = self.keys.derive(&upload.filename);

        let record = NewFileRecord {
            mime_type: infer_mime_type(&upload.filename),
            filename: upload.filename,
            size_bytes: size as i64,
            blob_key: blob_key.locator.clone(),
            description: upload.description.unwrap_or_default(),
        };

        let (blob_result, meta_result) = tokio::join!(
            write_blob(
                self.blobs.as_ref(),
                strategy,
                &blob_key.key,
                upload.data,
                self.config.blob_write_timeout(size),
            ),
            with_metadata_deadline(self.config.metadata_timeout, self.meta.insert(record)),
        );

        match (blob_result, meta_result) {
            (Ok(()), Ok(id)) => {
                info!(
                    subsystem = "files",
                    component = "upload",
                    op = "upload",
                    file_id = id,
                    blob_key = %blob_key.key,
                    size_bytes = size,
                    strategy = %strategy,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "File uploaded"
                );
                Ok(id)
            }
            (Err(blob_err), Ok(id)) => {
                let err = Error::PartialFailure {
                    landed: Leg::Metadata,
                    failed: Leg::Blob,
                    orphan: Orphan::Row(id),
                    cause: Box::new(Error::BlobWrite {
                        key: blob_key.key.clone(),
                        source: blob_err,
                    }),
                };
                warn!(
                    subsystem = "files",
                    component = "upload",
                    op = "upload",
                    file_id = id,
                    blob_key = %blob_key.key,
                    commit_unknown = err.commit_unknown(),
                    error = %err,
                    "Blob write failed after metadata insert, orphan row possible"
                );
                Err(err)
            }
            (Ok(()), Err(meta_err)) => {
                let err = Error::PartialFailure {
                    landed: Leg::Blob,
                    failed: Leg::Metadata,
                    orphan: Orphan::Blob(blob_key.key.clone()),
                    cause: Box::new(Error::MetadataWrite(meta_err)),
                };
                // A timed-out insert may have committed a row nobody got the id of.
                warn!(
                    subsystem = "files",
                    component = "upload",
                    op = "upload",
                    blob_key = %blob_key.key,
                    commit_unknown = err.commit_unknown(),
                    error = %err,
                    "Metadata insert failed after blob write, orphan blob possible"
                );
                Err(err)
            }
            (Err(blob_err), Err(meta_err)) => {
                error!(
                    subsystem = "files",
                    component = "upload",
                    op = "upload",
                    blob_key = %blob_key.key,
                    blob_error = %blob_err,
                    metadata_error = %meta_err,
                    "Upload failed on both stores"
                );
                Err(Error::DualWrite {
                    key: blob_key.key,
                    blob: blob_err,
                    metadata: meta_err,
                })
            }
        }
    }
}
