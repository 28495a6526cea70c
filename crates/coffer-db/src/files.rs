//! File metadata repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use coffer_core::{FileRecord, FileStatus, FileUpdate, MetadataStore, NewFileRecord, StoreError};

const RECORD_COLUMNS: &str = "id, filename, size_bytes, blob_key, mime_type, description, \
     status, created_at, updated_at, deactivated_at, blob_reclaimed_at";

/// PostgreSQL implementation of MetadataStore over the `file_metadata` table.
#[derive(Clone)]
pub struct PgFileRepository {
    pool: Pool<Postgres>,
}

impl PgFileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<FileRecord, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(FileRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        size_bytes: row.try_get("size_bytes")?,
        blob_key: row.try_get("blob_key")?,
        mime_type: row.try_get("mime_type")?,
        description: row.try_get("description")?,
        status: status.parse::<FileStatus>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deactivated_at: row.try_get("deactivated_at")?,
        blob_reclaimed_at: row.try_get("blob_reclaimed_at")?,
    })
}

#[async_trait]
impl MetadataStore for PgFileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO file_metadata (filename, size_bytes, blob_key, mime_type, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&record.filename)
        .bind(record.size_bytes)
        .bind(&record.blob_key)
        .bind(&record.mime_type)
        .bind(&record.description)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(
            subsystem = "database",
            component = "files",
            op = "insert",
            file_id = id,
            "Inserted file record"
        );
        Ok(id)
    }

    async fn update(&self, id: i64, fields: FileUpdate) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE file_metadata
            SET filename = $2, size_bytes = $3, blob_key = $4, mime_type = $5,
                description = $6, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(&fields.filename)
        .bind(fields.size_bytes)
        .bind(&fields.blob_key)
        .bind(&fields.mime_type)
        .bind(&fields.description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: i64) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM file_metadata WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn soft_delete(&self, id: i64) -> Result<(), StoreError> {
        // deactivated_at and updated_at only move on the first transition.
        let result = sqlx::query(
            r#"
            UPDATE file_metadata
            SET status = 'inactive',
                deactivated_at = COALESCE(deactivated_at, NOW()),
                updated_at = CASE WHEN status = 'active' THEN NOW() ELSE updated_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_inactive(&self, before: DateTime<Utc>) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM file_metadata
            WHERE status = 'inactive'
              AND deactivated_at < $1
              AND blob_reclaimed_at IS NULL
            ORDER BY id
            "#,
            RECORD_COLUMNS
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM file_metadata WHERE id = $1 AND status = 'active')",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_active(&self) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM file_metadata WHERE status = 'active' ORDER BY id",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn mark_reclaimed(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE file_metadata
            SET blob_reclaimed_at = NOW()
            WHERE id = $1 AND status = 'inactive'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
