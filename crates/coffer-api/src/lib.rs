//! # coffer-api
//!
//! HTTP surface for coffer: the file routes over [`FileService`] and an
//! admin route that triggers a retention sweep.
//!
//! | Method | Path | Success |
//! |--------|------|---------|
//! | POST | `/api/files/upload` | `{"id": n}` |
//! | GET | `/api/files/:id` | record JSON, 204 when absent or inactive |
//! | PUT | `/api/files/:id` | `{"status": "success"}` |
//! | DELETE | `/api/files/:id` | `{"status": "success"}` |
//! | GET | `/api/files` | active records, 204 when none |
//! | POST | `/api/admin/sweep` | sweep report |
//! | GET | `/health` | `{"status": "ok"}` |

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use coffer_core::defaults::{self, env_parse, env_value};
use coffer_files::FileService;
use coffer_jobs::RetentionSweeper;

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileService>,
    pub sweeper: Arc<RetentionSweeper>,
}

/// Listener and request limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request body ceiling; larger uploads are rejected with 413.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT` and `COFFER_MAX_UPLOAD_BYTES`.
    pub fn from_env() -> Self {
        Self {
            host: env_value("HOST").unwrap_or_else(|| defaults::SERVER_HOST.to_string()),
            port: env_parse("PORT", defaults::SERVER_PORT),
            max_upload_bytes: env_parse(defaults::ENV_MAX_UPLOAD_BYTES, defaults::MAX_UPLOAD_BYTES),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/files", get(handlers::list_files))
        .route("/api/files/upload", post(handlers::upload_file))
        .route(
            "/api/files/:id",
            get(handlers::get_file)
                .put(handlers::update_file)
                .delete(handlers::delete_file),
        )
        .route("/api/admin/sweep", post(handlers::run_sweep))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        // Multipart extraction has its own 2 MB default; lift it to the same ceiling.
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}
