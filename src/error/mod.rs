// Error types for promptcache
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cache is not initialized (run `promptcache init` first)")]
    NotInitialized,

    #[error("invalid TTL string: {0:?} (expected <number><d|h|m|s>, e.g. \"7d\")")]
    InvalidTtl(String),

    #[error("invalid import strategy: {0:?} (expected replace, merge or skip-existing)")]
    InvalidStrategy(String),

    #[error("unknown storage backend: {0:?} (expected json or sqlite)")]
    InvalidBackend(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

// Convert StoreError to HTTP responses for Axum
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            StoreError::NotInitialized => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_initialized",
                self.to_string(),
            ),
            StoreError::InvalidTtl(_)
            | StoreError::InvalidStrategy(_)
            | StoreError::InvalidBackend(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                self.to_string(),
            ),
            StoreError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                self.to_string(),
            ),
        };

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
