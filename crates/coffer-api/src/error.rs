//! Mapping from coffer errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use coffer_core::Error;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Store or partial failure; carries the leg that failed.
    Store(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, failed_leg) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Store(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                err.failed_leg().map(|leg| leg.to_string()),
            ),
        };

        let body = Json(serde_json::json!({
            "status": "failure",
            "error": message,
            "failed_leg": failed_leg,
        }));

        (status, body).into_response()
    }
}
