//! # coffer-db
//!
//! Storage layer for coffer.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgFileRepository`], the PostgreSQL `MetadataStore`
//! - Filesystem and `object_store` blob backends
//! - In-memory stores with fault injection for tests and local runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use coffer_db::{blob_store_from_env, Database};
//!
//! let db = Database::connect("postgres://localhost/coffer").await?;
//! db.migrate().await?;
//! let blobs = blob_store_from_env().await?;
//! ```

pub mod blob;
pub mod files;
pub mod memory;
pub mod pool;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

pub use coffer_core::*;

pub use blob::{FilesystemBackend, ObjectStoreBackend};
pub use files::PgFileRepository;
pub use memory::{BlobCall, MemoryBlobStore, MemoryMetadataStore, MetaCall};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// File metadata repository.
    pub files: PgFileRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            files: PgFileRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> std::result::Result<Self, StoreError> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(
        url: &str,
        config: PoolConfig,
    ) -> std::result::Result<Self, StoreError> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> std::result::Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

/// Which [`BlobStore`] implementation to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackendKind {
    Filesystem,
    S3,
    Memory,
}

impl fmt::Display for BlobBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobBackendKind::Filesystem => f.write_str("filesystem"),
            BlobBackendKind::S3 => f.write_str("s3"),
            BlobBackendKind::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for BlobBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Ok(BlobBackendKind::Filesystem),
            "s3" | "minio" => Ok(BlobBackendKind::S3),
            "memory" => Ok(BlobBackendKind::Memory),
            other => Err(Error::Config(format!(
                "unknown blob backend '{}' (expected filesystem, s3 or memory)",
                other
            ))),
        }
    }
}

/// Build the blob store selected by `COFFER_BLOB_BACKEND`.
pub async fn blob_store_from_env() -> Result<Arc<dyn BlobStore>> {
    let kind = match defaults::env_value(defaults::ENV_BLOB_BACKEND) {
        Some(v) => v.parse::<BlobBackendKind>()?,
        None => BlobBackendKind::Filesystem,
    };
    let part_size = defaults::env_parse(
        defaults::ENV_MULTIPART_PART_SIZE_BYTES,
        defaults::MULTIPART_PART_SIZE_BYTES,
    );

    let store: Arc<dyn BlobStore> = match kind {
        BlobBackendKind::Filesystem => {
            let path = defaults::env_value(defaults::ENV_FILE_STORAGE_PATH)
                .unwrap_or_else(|| defaults::FILE_STORAGE_PATH.to_string());
            let backend = FilesystemBackend::new(&path).with_part_size(part_size);
            backend.validate().await.map_err(|e| {
                Error::Config(format!("blob storage at {} is not usable: {}", path, e))
            })?;
            Arc::new(backend)
        }
        BlobBackendKind::S3 => {
            let backend = ObjectStoreBackend::s3_from_env()
                .map_err(|e| Error::Config(e.to_string()))?
                .with_part_size(part_size);
            Arc::new(backend)
        }
        BlobBackendKind::Memory => Arc::new(MemoryBlobStore::new()),
    };

    info!(
        subsystem = "storage",
        component = "blob",
        op = "configure",
        backend = %kind,
        "Blob backend configured"
    );
    Ok(store)
}
