//! Deferred deletion of superseded blobs.
//!
//! After an update commits, the previous blob is handed to a [`BlobReaper`]:
//! a bounded queue drained by one task the reaper owns. Deletes are best
//! effort. A failed or dropped delete leaves an orphan blob and is only
//! logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use coffer_core::{BlobStore, Error, Result};

use crate::transfer::with_blob_deadline;

enum ReaperMsg {
    Delete(String),
    /// Acknowledged once every earlier message has been handled.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Owned background queue of blob deletions.
pub struct BlobReaper {
    tx: mpsc::Sender<ReaperMsg>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BlobReaper {
    /// Start the reaper task. Must be called inside a tokio runtime.
    pub fn spawn(blobs: Arc<dyn BlobStore>, capacity: usize, delete_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run(blobs, rx, delete_timeout));
        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue `key` for deletion without waiting.
    ///
    /// Returns `false` when the queue is full or the reaper has stopped; the
    /// blob is then left in place.
    pub fn enqueue(&self, key: String) -> bool {
        match self.tx.try_send(ReaperMsg::Delete(key)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ReaperMsg::Delete(key))) => {
                warn!(
                    subsystem = "files",
                    component = "reaper",
                    op = "enqueue",
                    blob_key = %key,
                    "Reaper queue full, superseded blob left as orphan"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(ReaperMsg::Delete(key))) => {
                warn!(
                    subsystem = "files",
                    component = "reaper",
                    op = "enqueue",
                    blob_key = %key,
                    "Reaper stopped, superseded blob left as orphan"
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Wait until every delete queued before this call has been attempted.
    pub async fn drain(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(ReaperMsg::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Process what is already queued, then stop the task.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        let _ = self.tx.send(ReaperMsg::Shutdown).await;
        task.await
            .map_err(|e| Error::Internal(format!("Blob reaper task failed: {}", e)))
    }
}

async fn run(blobs: Arc<dyn BlobStore>, mut rx: mpsc::Receiver<ReaperMsg>, limit: Duration) {
    debug!(subsystem = "files", component = "reaper", "Blob reaper started");

    while let Some(msg) = rx.recv().await {
        match msg {
            ReaperMsg::Delete(key) => {
                match with_blob_deadline(limit, blobs.delete(&key)).await {
                    Ok(()) => info!(
                        subsystem = "files",
                        component = "reaper",
                        op = "delete",
                        blob_key = %key,
                        "Superseded blob deleted"
                    ),
                    Err(e) => warn!(
                        subsystem = "files",
                        component = "reaper",
                        op = "delete",
                        blob_key = %key,
                        error = %e,
                        "Superseded blob delete failed, left as orphan"
                    ),
                }
            }
            ReaperMsg::Flush(ack) => {
                let _ = ack.send(());
            }
            ReaperMsg::Shutdown => break,
        }
    }

    rx.close();
    let mut abandoned = 0usize;
    while let Ok(msg) = rx.try_recv() {
        match msg {
            ReaperMsg::Delete(_) => abandoned += 1,
            ReaperMsg::Flush(ack) => {
                let _ = ack.send(());
            }
            ReaperMsg::Shutdown => {}
        }
    }
    if abandoned > 0 {
        error!(
            subsystem = "files",
            component = "reaper",
            abandoned,
            "Blob reaper stopped with deletes still queued"
        );
    }
    debug!(subsystem = "files", component = "reaper", "Blob reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coffer_db::MemoryBlobStore;

    #[tokio::test]
    async fn test_drain_waits_for_queued_deletes() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.seed("a_1", Bytes::from_static(b"a"));
        blobs.seed("b_2", Bytes::from_static(b"b"));
        let reaper = BlobReaper::spawn(blobs.clone(), 8, Duration::from_secs(1));

        assert!(reaper.enqueue("a_1".to_string()));
        assert!(reaper.enqueue("b_2".to_string()));
        reaper.drain().await;

        assert!(blobs.is_empty());
        assert_eq!(blobs.deletes(), vec!["a_1".to_string(), "b_2".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_surfaced() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.seed("a_1", Bytes::from_static(b"a"));
        blobs.fail_deletes(true);
        let reaper = BlobReaper::spawn(blobs.clone(), 8, Duration::from_secs(1));

        assert!(reaper.enqueue("a_1".to_string()));
        reaper.drain().await;

        assert!(blobs.contains("a_1"));
        assert_eq!(blobs.deletes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_delete() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.delay_deletes(Some(Duration::from_secs(1)));
        let reaper = BlobReaper::spawn(blobs.clone(), 1, Duration::from_secs(5));

        let accepted = (0..4)
            .map(|i| reaper.enqueue(format!("k_{}", i)))
            .filter(|ok| *ok)
            .count();
        assert!(accepted < 4);

        reaper.drain().await;
        assert_eq!(blobs.deletes().len(), accepted);
    }

    #[tokio::test]
    async fn test_shutdown_processes_queue_then_rejects() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.seed("a_1", Bytes::from_static(b"a"));
        let reaper = BlobReaper::spawn(blobs.clone(), 8, Duration::from_secs(1));

        assert!(reaper.enqueue("a_1".to_string()));
        reaper.shutdown().await.unwrap();
        assert!(!blobs.contains("a_1"));

        assert!(!reaper.enqueue("b_2".to_string()));
        reaper.shutdown().await.unwrap();
    }
}
