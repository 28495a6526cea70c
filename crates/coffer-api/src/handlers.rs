//! Request handlers for the file and admin routes.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::json;
use tracing::info;

use coffer_core::{Error, FileUpload};
use coffer_files::UpdateOutcome;
use coffer_jobs::SweepReport;

use crate::error::ApiError;
use crate::AppState;

/// Multipart field carrying the file content.
pub const FILE_FIELD: &str = "upload_file";
/// Optional multipart field carrying the description.
pub const DESCRIPTION_FIELD: &str = "description";

/// Read an upload form into a [`FileUpload`].
///
/// # Multipart Fields
/// - `upload_file`: file content (required); the part's filename is the display name
/// - `description`: free text (optional)
async fn read_upload(mut multipart: Multipart) -> Result<FileUpload, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some(FILE_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                file = Some((filename, data));
            }
            Some(DESCRIPTION_FIELD) => {
                description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing {} in multipart form", FILE_FIELD))
    })?;
    let mut upload = FileUpload::new(filename, data);
    upload.description = description;
    Ok(upload)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Store a new file; responds with the assigned id.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart).await?;
    let id = state.files.upload(upload).await?;
    Ok(Json(json!({ "id": id })))
}

/// Fetch an active record. Absent and inactive records answer 204.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    match state.files.get(id).await {
        Ok(record) => Ok(Json(record).into_response()),
        Err(Error::NotFound(_)) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(e.into()),
    }
}

/// List active records. An empty listing answers 204.
pub async fn list_files(State(state): State<AppState>) -> Result<Response, ApiError> {
    let records = state.files.list().await?;
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(records).into_response())
}

/// Replace the content of an active record.
pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart).await?;
    match state.files.update(id, upload).await? {
        UpdateOutcome::Replaced { .. } => Ok(Json(json!({ "status": "success" }))),
        UpdateOutcome::Unmatched { .. } => Err(ApiError::NotFound(format!(
            "file {} was deactivated during the update",
            id
        ))),
    }
}

/// Soft-delete a record. Repeating the call succeeds.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.files.deactivate(id).await?;
    Ok(Json(json!({ "status": "success" })))
}

/// Run a retention sweep now.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    info!(
        subsystem = "api",
        component = "admin",
        op = "sweep",
        "Manual sweep requested"
    );
    let report = state.sweeper.sweep().await?;
    Ok(Json(report))
}
