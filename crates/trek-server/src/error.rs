//! API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use trek_runtime::RuntimeError;
use trek_store::StoreError;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body failed validation.
    #[error("{0}")]
    BadRequest(String),

    /// Thread does not exist.
    #[error("thread not found: {0}")]
    NotFound(String),

    /// Thread already has a live run.
    #[error("thread is busy: {0}")]
    Conflict(String),

    /// Server is at its concurrency cap.
    #[error("server at capacity")]
    Unavailable,

    /// Anything else.
    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            error!(%source, "request failed");
        }
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::ThreadNotFound(id) => Self::NotFound(id),
            RuntimeError::ThreadBusy(id) => Self::Conflict(id),
            RuntimeError::ServerBusy { .. } => Self::Unavailable,
            other => Self::Internal(Box::new(other)),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ThreadNotFound(id) => Self::NotFound(id),
            other => Self::Internal(Box::new(other)),
        }
    }
}
