//! In-process stores.
//!
//! Both stores keep a log of every call and support fault injection, so the
//! coordinators and the sweeper can be exercised without PostgreSQL or S3.
//! They also back `COFFER_BLOB_BACKEND=memory` for local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use coffer_core::{
    BlobError, BlobStore, FileRecord, FileStatus, FileUpdate, MetadataStore, NewFileRecord,
    StoreError,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pause(delay: &Mutex<Option<Duration>>) {
    let delay = *lock(delay);
    if let Some(d) = delay {
        tokio::time::sleep(d).await;
    }
}

// =============================================================================
// BLOBS
// =============================================================================

/// A call made against [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCall {
    Put { key: String, size: usize },
    PutMultipart { key: String, size: usize },
    Delete { key: String },
}

impl BlobCall {
    pub fn key(&self) -> &str {
        match self {
            BlobCall::Put { key, .. } | BlobCall::PutMultipart { key, .. } => key,
            BlobCall::Delete { key } => key,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, BlobCall::Delete { .. })
    }
}

/// Hash-map blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<BlobCall>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    delete_delay: Mutex<Option<Duration>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put`/`put_multipart` fail with `Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every `delete` fail with `Unavailable`.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside each write before completing it.
    pub fn delay_writes(&self, delay: Option<Duration>) {
        *lock(&self.write_delay) = delay;
    }

    pub fn delay_deletes(&self, delay: Option<Duration>) {
        *lock(&self.delete_delay) = delay;
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<BlobCall> {
        lock(&self.calls).clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| !c.is_write())
            .map(|c| c.key().to_string())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.objects).contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.objects).is_empty()
    }

    /// Store an object directly, bypassing the call log.
    pub fn seed(&self, key: &str, data: impl Into<Bytes>) {
        lock(&self.objects).insert(key.to_string(), data.into());
    }

    async fn write(&self, call: BlobCall, key: &str, data: Bytes) -> Result<(), BlobError> {
        lock(&self.calls).push(call);
        pause(&self.write_delay).await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("injected write failure".to_string()));
        }
        lock(&self.objects).insert(key.to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        let call = BlobCall::Put {
            key: key.to_string(),
            size: data.len(),
        };
        self.write(call, key, data).await
    }

    async fn put_multipart(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        let call = BlobCall::PutMultipart {
            key: key.to_string(),
            size: data.len(),
        };
        self.write(call, key, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        lock(&self.calls).push(BlobCall::Delete {
            key: key.to_string(),
        });
        pause(&self.delete_delay).await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("injected delete failure".to_string()));
        }
        lock(&self.objects).remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.contains(key))
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// A call made against [`MemoryMetadataStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCall {
    Insert,
    Update(i64),
    Get(i64),
    SoftDelete(i64),
    ListInactive,
    Exists(i64),
    ListActive,
    MarkReclaimed(i64),
}

impl MetaCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MetaCall::Insert | MetaCall::Update(_) | MetaCall::SoftDelete(_) | MetaCall::MarkReclaimed(_)
        )
    }
}

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, FileRecord>,
}

/// Ordered-map metadata store with the same semantics as the PostgreSQL one.
#[derive(Default)]
pub struct MemoryMetadataStore {
    table: Mutex<Table>,
    calls: Mutex<Vec<MetaCall>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_reads: AtomicBool,
    fail_mark_reclaimed: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
    update_delay: Mutex<Option<Duration>>,
}

fn injected(op: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {} failure", op))
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Fail `get`, `exists`, `list_active` and `list_inactive`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mark_reclaimed(&self, fail: bool) {
        self.fail_mark_reclaimed.store(fail, Ordering::SeqCst);
    }

    pub fn delay_inserts(&self, delay: Option<Duration>) {
        *lock(&self.insert_delay) = delay;
    }

    pub fn delay_updates(&self, delay: Option<Duration>) {
        *lock(&self.update_delay) = delay;
    }

    pub fn calls(&self) -> Vec<MetaCall> {
        lock(&self.calls).clone()
    }

    /// Calls that could have changed a row.
    pub fn writes(&self) -> Vec<MetaCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    /// Current row, regardless of status, bypassing the call log.
    pub fn row(&self, id: i64) -> Option<FileRecord> {
        lock(&self.table).rows.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.table).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.table).rows.is_empty()
    }

    /// Move a record's deactivation time, e.g. past the retention window.
    pub fn set_deactivated_at(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut table = lock(&self.table);
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        row.deactivated_at = Some(at);
        Ok(())
    }

    fn record(&self, call: MetaCall) {
        lock(&self.calls).push(call);
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, record: NewFileRecord) -> Result<i64, StoreError> {
        self.record(MetaCall::Insert);
        pause(&self.insert_delay).await;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected("insert"));
        }

        let now = Utc::now();
        let mut table = lock(&self.table);
        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(
            id,
            FileRecord {
                id,
                filename: record.filename,
                size_bytes: record.size_bytes,
                blob_key: record.blob_key,
                mime_type: record.mime_type,
                description: record.description,
                status: FileStatus::Active,
                created_at: now,
                updated_at: now,
                deactivated_at: None,
                blob_reclaimed_at: None,
            },
        );
        Ok(id)
    }

    async fn update(&self, id: i64, fields: FileUpdate) -> Result<u64, StoreError> {
        self.record(MetaCall::Update(id));
        pause(&self.update_delay).await;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }

        let mut table = lock(&self.table);
        match table.rows.get_mut(&id) {
            Some(row) if row.is_active() => {
                row.filename = fields.filename;
                row.size_bytes = fields.size_bytes;
                row.blob_key = fields.blob_key;
                row.mime_type = fields.mime_type;
                row.description = fields.description;
                row.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn get(&self, id: i64) -> Result<Option<FileRecord>, StoreError> {
        self.record(MetaCall::Get(id));
        self.check_reads()?;
        Ok(lock(&self.table).rows.get(&id).cloned())
    }

    async fn soft_delete(&self, id: i64) -> Result<(), StoreError> {
        self.record(MetaCall::SoftDelete(id));
        let mut table = lock(&self.table);
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if row.is_active() {
            let now = Utc::now();
            row.status = FileStatus::Inactive;
            row.deactivated_at = Some(now);
            row.updated_at = now;
        }
        Ok(())
    }

    async fn list_inactive(&self, before: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        self.record(MetaCall::ListInactive);
        self.check_reads()?;
        Ok(lock(&self.table)
            .rows
            .values()
            .filter(|r| {
                !r.is_active()
                    && r.blob_reclaimed_at.is_none()
                    && r.deactivated_at.is_some_and(|at| at < before)
            })
            .cloned()
            .collect())
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        self.record(MetaCall::Exists(id));
        self.check_reads()?;
        Ok(lock(&self.table)
            .rows
            .get(&id)
            .is_some_and(FileRecord::is_active))
    }

    async fn list_active(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.record(MetaCall::ListActive);
        self.check_reads()?;
        Ok(lock(&self.table)
            .rows
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect())
    }

    async fn mark_reclaimed(&self, id: i64) -> Result<(), StoreError> {
        self.record(MetaCall::MarkReclaimed(id));
        if self.fail_mark_reclaimed.load(Ordering::SeqCst) {
            return Err(injected("mark_reclaimed"));
        }
        let mut table = lock(&self.table);
        match table.rows.get_mut(&id) {
            Some(row) if !row.is_active() => {
                row.blob_reclaimed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(StoreError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(name: &str) -> NewFileRecord {
        NewFileRecord {
            filename: name.to_string(),
            size_bytes: 3,
            blob_key: format!("mem://{}_1", name),
            mime_type: String::new(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential_and_never_reused() {
        let store = MemoryMetadataStore::new();
        let a = store.insert(new_record("a")).await.unwrap();
        let b = store.insert(new_record("b")).await.unwrap();
        store.soft_delete(a).await.unwrap();
        let c = store.insert(new_record("c")).await.unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_update_skips_inactive_rows() {
        let store = MemoryMetadataStore::new();
        let id = store.insert(new_record("a")).await.unwrap();
        store.soft_delete(id).await.unwrap();

        let fields = FileUpdate::from(new_record("b"));
        assert_eq!(store.update(id, fields).await.unwrap(), 0);
        assert_eq!(store.row(id).unwrap().filename, "a");
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_first_deactivation_time() {
        let store = MemoryMetadataStore::new();
        let id = store.insert(new_record("a")).await.unwrap();
        store.soft_delete(id).await.unwrap();
        let first = store.row(id).unwrap().deactivated_at;
        store.soft_delete(id).await.unwrap();
        assert_eq!(store.row(id).unwrap().deactivated_at, first);
    }

    #[tokio::test]
    async fn test_soft_delete_absent_is_not_found() {
        let store = MemoryMetadataStore::new();
        let err = store.soft_delete(9).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(9)));
    }

    #[tokio::test]
    async fn test_list_inactive_excludes_reclaimed() {
        let store = MemoryMetadataStore::new();
        let id = store.insert(new_record("a")).await.unwrap();
        store.soft_delete(id).await.unwrap();
        let later = Utc::now() + chrono::Duration::seconds(1);

        assert_eq!(store.list_inactive(later).await.unwrap().len(), 1);
        store.mark_reclaimed(id).await.unwrap();
        assert!(store.list_inactive(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_fault_injection() {
        let store = MemoryBlobStore::new();
        store.fail_writes(true);
        assert!(store.put("k_1", Bytes::from_static(b"x")).await.is_err());
        assert!(!store.contains("k_1"));
        assert_eq!(store.calls().len(), 1);

        store.fail_writes(false);
        store.put("k_1", Bytes::from_static(b"x")).await.unwrap();
        assert!(store.contains("k_1"));
    }
}
