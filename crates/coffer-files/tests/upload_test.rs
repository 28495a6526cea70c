//! Upload coordination against in-memory stores with injected faults.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use coffer_core::{BlobError, Error, FileUpload, KeyScheme, Leg, Orphan, StoreError};
use coffer_db::{BlobCall, MemoryBlobStore, MemoryMetadataStore, MetaCall};
use coffer_files::{FileService, TransferConfig};

struct Harness {
    blobs: Arc<MemoryBlobStore>,
    meta: Arc<MemoryMetadataStore>,
    service: FileService,
}

fn harness(config: TransferConfig) -> Harness {
    let blobs = Arc::new(MemoryBlobStore::new());
    let meta = Arc::new(MemoryMetadataStore::new());
    let service = FileService::new(
        blobs.clone(),
        meta.clone(),
        KeyScheme::new("mem://uploads"),
        config,
    );
    Harness {
        blobs,
        meta,
        service,
    }
}

fn upload(name: &str, len: usize) -> FileUpload {
    FileUpload::new(name, vec![b'x'; len])
}

#[tokio::test]
async fn test_upload_record_resolves_to_existing_blob() {
    let h = harness(TransferConfig::default());

    let id = h
        .service
        .upload(FileUpload::new("report.pdf", &b"%PDF-1.7"[..]).with_description("q3"))
        .await
        .unwrap();

    let record = h.service.get(id).await.unwrap();
    let key = h.service.keys().key_of(&record.blob_key);
    assert!(record.blob_key.starts_with("mem://uploads/report.pdf_"));
    assert_eq!(h.blobs.object(key), Some(Bytes::from_static(b"%PDF-1.7")));
    assert_eq!(record.filename, "report.pdf");
    assert_eq!(record.size_bytes, 8);
    assert_eq!(record.mime_type, "application/pdf");
    assert_eq!(record.description, "q3");
}

#[tokio::test]
async fn test_threshold_boundary_selects_strategy() {
    let h = harness(TransferConfig::default().with_multipart_threshold(16));

    h.service.upload(upload("exact.bin", 16)).await.unwrap();
    h.service.upload(upload("over.bin", 17)).await.unwrap();

    let calls = h.blobs.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], BlobCall::Put { size: 16, .. }));
    assert!(matches!(&calls[1], BlobCall::PutMultipart { size: 17, .. }));
}

#[tokio::test]
async fn test_default_threshold_is_five_mebibytes() {
    let h = harness(TransferConfig::default());
    let five_mib = 5 * 1024 * 1024;

    h.service.upload(upload("at.bin", five_mib)).await.unwrap();
    h.service.upload(upload("past.bin", five_mib + 1)).await.unwrap();

    let calls = h.blobs.calls();
    assert!(matches!(&calls[0], BlobCall::Put { .. }));
    assert!(matches!(&calls[1], BlobCall::PutMultipart { .. }));
}

#[tokio::test]
async fn test_blob_failure_after_insert_returns_no_id() {
    let h = harness(TransferConfig::default());
    h.blobs.fail_writes(true);

    let err = h.service.upload(upload("a.txt", 4)).await.unwrap_err();

    match err {
        Error::PartialFailure {
            landed,
            failed,
            orphan: Orphan::Row(id),
            cause,
        } => {
            assert_eq!(landed, Leg::Metadata);
            assert_eq!(failed, Leg::Blob);
            assert!(matches!(*cause, Error::BlobWrite { .. }));
            // The orphan row is left for reconciliation.
            assert!(h.meta.row(id).is_some());
        }
        other => panic!("expected partial failure with orphan row, got {other:?}"),
    }
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn test_metadata_failure_names_orphan_blob() {
    let h = harness(TransferConfig::default());
    h.meta.fail_inserts(true);

    let err = h.service.upload(upload("a.txt", 4)).await.unwrap_err();

    assert_eq!(err.failed_leg(), Some(Leg::Metadata));
    assert!(!err.commit_unknown());
    match err {
        Error::PartialFailure {
            landed: Leg::Blob,
            orphan: Orphan::Blob(key),
            ..
        } => assert!(h.blobs.contains(&key)),
        other => panic!("expected partial failure with orphan blob, got {other:?}"),
    }
    assert!(h.meta.is_empty());
}

#[tokio::test]
async fn test_both_legs_failing_is_dual_write() {
    let h = harness(TransferConfig::default());
    h.blobs.fail_writes(true);
    h.meta.fail_inserts(true);

    let err = h.service.upload(upload("a.txt", 4)).await.unwrap_err();

    assert!(matches!(
        err,
        Error::DualWrite {
            blob: BlobError::Unavailable(_),
            metadata: StoreError::Unavailable(_),
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_legs_run_concurrently() {
    let h = harness(TransferConfig::default());
    h.blobs.delay_writes(Some(Duration::from_millis(500)));
    h.meta.delay_inserts(Some(Duration::from_millis(500)));

    let start = tokio::time::Instant::now();
    h.service.upload(upload("a.txt", 4)).await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(900));
}

#[tokio::test(start_paused = true)]
async fn test_join_waits_for_slow_leg_before_reporting() {
    let h = harness(TransferConfig::default());
    h.blobs.fail_writes(true);
    h.meta.delay_inserts(Some(Duration::from_millis(800)));

    let err = h.service.upload(upload("a.txt", 4)).await.unwrap_err();

    // The insert finished even though the blob leg failed first.
    assert!(matches!(
        err,
        Error::PartialFailure {
            orphan: Orphan::Row(_),
            ..
        }
    ));
    assert_eq!(h.meta.calls(), vec![MetaCall::Insert]);
    assert_eq!(h.meta.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_blob_write_times_out() {
    let config = TransferConfig::default()
        .with_blob_timeout(Duration::from_millis(100), Duration::ZERO);
    let h = harness(config);
    h.blobs.delay_writes(Some(Duration::from_secs(60)));

    let err = h.service.upload(upload("a.txt", 4)).await.unwrap_err();

    match err {
        Error::PartialFailure { cause, .. } => assert!(matches!(
            *cause,
            Error::BlobWrite {
                source: BlobError::Timeout(_),
                ..
            }
        )),
        other => panic!("expected partial failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_metadata_insert_times_out() {
    let h = harness(TransferConfig::default());
    h.meta.delay_inserts(Some(Duration::from_secs(10)));

    let err = h.service.upload(upload("a.txt", 4)).await.unwrap_err();
    assert!(err.commit_unknown());

    match err {
        Error::PartialFailure {
            failed: Leg::Metadata,
            cause,
            ..
        } => assert!(matches!(
            *cause,
            Error::MetadataWrite(StoreError::Timeout(d)) if d == Duration::from_millis(2000)
        )),
        other => panic!("expected metadata timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_uploads_of_same_name_get_distinct_keys() {
    let h = Arc::new(harness(TransferConfig::default()));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.service.upload(upload("same.txt", 3)).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.blobs.len(), 16);
    assert_eq!(h.service.list().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_zero_byte_upload_with_empty_name() {
    let h = harness(TransferConfig::default());

    let id = h.service.upload(FileUpload::new("", Bytes::new())).await.unwrap();

    let record = h.service.get(id).await.unwrap();
    assert_eq!(record.size_bytes, 0);
    assert_eq!(record.mime_type, "");
    assert!(h.service.keys().key_of(&record.blob_key).starts_with("file_"));
}
