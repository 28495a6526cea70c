//! Blob backends behave the same behind the `BlobStore` trait.

use std::sync::Arc;

use bytes::Bytes;
use coffer_core::BlobStore;
use coffer_db::{FilesystemBackend, MemoryBlobStore, ObjectStoreBackend};
use object_store::memory::InMemory;
use tempfile::TempDir;

async fn exercise(store: &dyn BlobStore) {
    let small = Bytes::from_static(b"small object");
    let large = Bytes::from(vec![0xABu8; 64 * 1024]);

    store.put("small.txt_1", small).await.expect("put");
    store
        .put_multipart("large.bin_2", large)
        .await
        .expect("put_multipart");

    assert!(store.exists("small.txt_1").await.unwrap());
    assert!(store.exists("large.bin_2").await.unwrap());

    store.delete("small.txt_1").await.expect("delete");
    assert!(!store.exists("small.txt_1").await.unwrap());

    // Deleting twice is not an error.
    store.delete("small.txt_1").await.expect("second delete");
    assert!(store.exists("large.bin_2").await.unwrap());
}

#[tokio::test]
async fn test_filesystem_backend_contract() {
    let dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(dir.path()).with_part_size(8 * 1024);
    exercise(&backend).await;
}

#[tokio::test]
async fn test_object_store_backend_contract() {
    let backend =
        ObjectStoreBackend::with_object_store(Arc::new(InMemory::new())).with_part_size(8 * 1024);
    exercise(&backend).await;
}

#[tokio::test]
async fn test_memory_backend_contract() {
    let backend = MemoryBlobStore::new();
    exercise(&backend).await;
}
