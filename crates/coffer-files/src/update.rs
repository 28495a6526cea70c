//! Update coordination: replace a record's content with a freshly keyed blob.
//!
//! The new blob is written before the record is repointed, so the record
//! never names a key that does not exist. The previous blob is deleted only
//! after the record commits, through the [`BlobReaper`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use coffer_core::{
    infer_mime_type, BlobStore, Error, FileUpdate, FileUpload, KeyScheme, Leg, MetadataStore,
    Orphan, Result,
};

use crate::config::TransferConfig;
use crate::reaper::BlobReaper;
use crate::transfer::{with_metadata_deadline, write_blob, UploadStrategy};

/// What an accepted update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record now points at `new_key`; `previous_key` was queued for deletion
    /// unless it is the same key.
    Replaced {
        previous_key: String,
        new_key: String,
    },
    /// The record was deactivated between the read and the write. Nothing was
    /// repointed and the freshly written blob is unreferenced.
    Unmatched { orphan_key: String },
}

impl UpdateOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, UpdateOutcome::Replaced { .. })
    }
}

/// Replaces the content of existing active records.
pub struct UpdateCoordinator {
    blobs: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    reaper: Arc<BlobReaper>,
    keys: KeyScheme,
    config: TransferConfig,
}

impl UpdateCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        reaper: Arc<BlobReaper>,
        keys: KeyScheme,
        config: TransferConfig,
    ) -> Self {
        Self {
            blobs,
            meta,
            reaper,
            keys,
            config,
        }
    }

    /// Write the new blob, then repoint the record at it.
    ///
    /// A failed repoint returns `PartialFailure` naming the new blob as the
    /// orphan. If the repoint timed out it may still have committed, so the
    /// old blob may be the unreferenced one instead, and the error's
    /// [`Error::commit_unknown`] is true. No reap is queued after a failure.
    pub async fn update(&self, id: i64, upload: FileUpload) -> Result<UpdateOutcome> {
        if id <= 0 {
            return Err(Error::Validation(format!(
                "file id must be positive, got {}",
                id
            )));
        }
        let start = Instant::now();

        let current = with_metadata_deadline(self.config.metadata_timeout, self.meta.get(id))
            .await
            .map_err(Error::MetadataRead)?;
        let current = match current {
            Some(record) if record.is_active() => record,
            _ => return Err(Error::NotFound(format!("file {}", id))),
        };

        let size = upload.size();
        let strategy = UploadStrategy::for_size(size, self.config.multipart_threshold);
        let blob_key = self.keys.derive(&upload.filename);

        write_blob(
            self.blobs.as_ref(),
            strategy,
            &blob_key.key,
            upload.data,
            self.config.blob_write_timeout(size),
        )
        .await
        .map_err(|source| Error::BlobWrite {
            key: blob_key.key.clone(),
            source,
        })?;

        let fields = FileUpdate {
            mime_type: infer_mime_type(&upload.filename),
            filename: upload.filename,
            size_bytes: size as i64,
            blob_key: blob_key.locator.clone(),
            description: upload.description.unwrap_or_default(),
        };

        let matched =
            match with_metadata_deadline(self.config.metadata_timeout, self.meta.update(id, fields))
                .await
            {
                Ok(matched) => matched,
                Err(e) => {
                    let err = Error::PartialFailure {
                        landed: Leg::Blob,
                        failed: Leg::Metadata,
                        orphan: Orphan::Blob(blob_key.key.clone()),
                        cause: Box::new(Error::MetadataWrite(e)),
                    };
                    // A timed-out update may have repointed the record, in which
                    // case the old blob is the unreferenced one.
                    warn!(
                        subsystem = "files",
                        component = "update",
                        op = "update",
                        file_id = id,
                        blob_key = %blob_key.key,
                        commit_unknown = err.commit_unknown(),
                        error = %err,
                        "Metadata update failed after blob write, orphan blob possible"
                    );
                    return Err(err);
                }
            };

        if matched == 0 {
            warn!(
                subsystem = "files",
                component = "update",
                op = "update",
                file_id = id,
                blob_key = %blob_key.key,
                "Record deactivated during update, new blob left as orphan"
            );
            return Ok(UpdateOutcome::Unmatched {
                orphan_key: blob_key.key,
            });
        }

        let previous_key = self.keys.key_of(&current.blob_key).to_string();
        if previous_key != blob_key.key {
            self.reaper.enqueue(previous_key.clone());
        }

        info!(
            subsystem = "files",
            component = "update",
            op = "update",
            file_id = id,
            blob_key = %blob_key.key,
            previous_key = %previous_key,
            size_bytes = size,
            strategy = %strategy,
            duration_ms = start.elapsed().as_millis() as u64,
            "File content replaced"
        );

        Ok(UpdateOutcome::Replaced {
            previous_key,
            new_key: blob_key.key,
        })
    }
}
