//! API error handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_core::error::CoreError;
use thiserror::Error;
use tracing::warn;

/// API error
#[derive(Debug, Error)]
pub enum ApiError {
    /// Internal server error
    #[error("internal server error: {0}")]
    Internal(String),

    /// Unknown metric
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or rejected request
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
}

impl ApiError {
    /// Status code this error renders as
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(msg) | ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg,
        };

        let body = ErrorResponse {
            error: message,
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            e if e.is_client_error() => ApiError::BadRequest(err.to_string()),
            _ => {
                warn!("request failed: {err}");
                ApiError::Internal(err.to_string())
            }
        }
    }
}
