//! Blob storage backends.
//!
//! - [`FilesystemBackend`]: one file per key under a base directory, written
//!   atomically via temp file + rename
//! - [`ObjectStoreBackend`]: any `object_store` implementation; S3 and MinIO
//!   are configured from the environment
//!
//! ## Example
//!
//! ```rust,ignore
//! use coffer_db::blob::FilesystemBackend;
//!
//! let backend = FilesystemBackend::new("/var/lib/coffer/blobs");
//! backend.put("report.pdf_1760000000000000000", data).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use coffer_core::defaults;
use coffer_core::{BlobError, BlobStore};

/// Reject keys that are not a single, plain path segment.
fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
    {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// Removes a temp file on drop unless [`TempFileGuard::persisted`] was called.
///
/// Covers every early return in [`FilesystemBackend::write_atomic`] and a
/// write future dropped at its deadline.
struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// The temp file was renamed into place; leave it alone.
    fn persisted(mut self) {
        self.path = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(temp_path = %path.display(), error = %e, "blob: temp file cleanup failed");
                }
            }
        }
    }
}

/// Filesystem storage backend.
///
/// Path format: `{base_path}/{key}`. Keys are single path segments.
pub struct FilesystemBackend {
    base_path: PathBuf,
    part_size: usize,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            part_size: defaults::MULTIPART_PART_SIZE_BYTES,
        }
    }

    /// Size of each chunk written by [`BlobStore::put_multipart`].
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Write, read back and delete a check file so permission problems show
    /// up at startup instead of on the first upload.
    pub async fn validate(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.base_path).await?;
        let check = self.base_path.join(".health-check");
        let data = b"storage-health-check";
        fs::write(&check, data).await?;
        let read_back = fs::read(&check).await?;
        let _ = fs::remove_file(&check).await;
        if read_back != data {
            return Err(BlobError::Unavailable(format!(
                "read-back mismatch under {}",
                self.base_path.display()
            )));
        }
        Ok(())
    }

    /// Write `chunks` to a temp file next to the target, fsync, then rename.
    async fn write_atomic<'a, I>(&self, key: &str, chunks: I) -> Result<(), BlobError>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let full_path = self.full_path(key)?;
        fs::create_dir_all(&self.base_path).await?;

        let temp_path = self.base_path.join(format!(".{}.tmp", key));
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "blob: File::create failed");
            e
        })?;
        let guard = TempFileGuard::new(temp_path.clone());

        let mut written = 0usize;
        for chunk in chunks {
            file.write_all(chunk).await.map_err(|e| {
                warn!(blob_key = %key, error = %e, "blob: write_all failed");
                e
            })?;
            written += chunk.len();
        }
        file.sync_all().await.map_err(|e| {
            warn!(blob_key = %key, error = %e, "blob: sync_all failed");
            e
        })?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "blob: rename failed");
            e
        })?;
        guard.persisted();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        debug!(blob_key = %key, size_bytes = written, "blob: stored on filesystem");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        self.write_atomic(key, std::iter::once(data.as_ref())).await
    }

    async fn put_multipart(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        self.write_atomic(key, data.chunks(self.part_size)).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let full_path = self.full_path(key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let full_path = self.full_path(key)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

// =============================================================================
// OBJECT STORE
// =============================================================================

/// Blob backend over an `object_store` implementation.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    part_size: usize,
    max_concurrency: usize,
}

impl ObjectStoreBackend {
    /// Wrap a custom object store (an `InMemory` store in tests).
    pub fn with_object_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            part_size: defaults::MULTIPART_PART_SIZE_BYTES,
            max_concurrency: defaults::MULTIPART_MAX_CONCURRENCY,
        }
    }

    /// Build an S3 backend from the environment.
    ///
    /// Reads `S3_BUCKET`, `S3_REGION` and, for MinIO or other S3-compatible
    /// services, `S3_ENDPOINT`. Credentials come from the standard `AWS_*`
    /// variables.
    pub fn s3_from_env() -> Result<Self, BlobError> {
        let bucket = defaults::env_value(defaults::ENV_S3_BUCKET)
            .unwrap_or_else(|| defaults::S3_BUCKET.to_string());
        let region = defaults::env_value(defaults::ENV_S3_REGION)
            .unwrap_or_else(|| defaults::S3_REGION.to_string());

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .with_region(&region);

        if let Some(endpoint) = defaults::env_value(defaults::ENV_S3_ENDPOINT) {
            builder = builder
                .with_allow_http(endpoint.starts_with("http://"))
                .with_endpoint(endpoint);
        }

        let store = builder.build().map_err(|e| {
            BlobError::Unavailable(format!("Failed to build S3 store: {}", e))
        })?;

        debug!(bucket = %bucket, region = %region, "blob: S3 backend configured");
        Ok(Self::with_object_store(Arc::new(store)))
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    fn path(key: &str) -> Result<ObjectPath, BlobError> {
        validate_key(key)?;
        ObjectPath::parse(key).map_err(|_| BlobError::InvalidKey(key.to_string()))
    }

    async fn write_parts(&self, writer: &mut WriteMultipart, data: &Bytes) -> Result<(), BlobError> {
        for chunk in data.chunks(self.part_size) {
            writer
                .wait_for_capacity(self.max_concurrency)
                .await
                .map_err(object_store_error)?;
            writer.write(chunk);
        }
        Ok(())
    }
}

fn object_store_error(e: object_store::Error) -> BlobError {
    BlobError::ObjectStore(e.to_string())
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        let path = Self::path(key)?;
        self.store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(object_store_error)?;
        Ok(())
    }

    async fn put_multipart(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        let path = Self::path(key)?;
        let upload = self
            .store
            .put_multipart(&path)
            .await
            .map_err(object_store_error)?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        if let Err(e) = self.write_parts(&mut writer, &data).await {
            if let Err(abort_err) = writer.abort().await {
                warn!(blob_key = %key, error = %abort_err, "blob: multipart abort failed");
            }
            return Err(e);
        }

        writer.finish().await.map_err(object_store_error)?;
        debug!(blob_key = %key, size_bytes = data.len(), "blob: multipart upload complete");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = Self::path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(object_store_error(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = Self::path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(object_store_error(e)),
        }
    }
}
