//! Error types for nrp-server HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::SubmissionError;
use crate::store::StoreError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Well-formed request carrying invalid report data (400)
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Report store or job ledger failure (500)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error (500)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Invalid(errors) => ApiError::Validation(errors),
            SubmissionError::Store(err) => ApiError::Store(err),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = match self {
            ApiError::NotFound(msg) => json!({
                "error": { "code": "NOT_FOUND", "message": msg }
            }),
            ApiError::BadRequest(msg) => json!({
                "error": { "code": "BAD_REQUEST", "message": msg }
            }),
            ApiError::Validation(details) => json!({
                "error": {
                    "code": "VALIDATION_FAILED",
                    "message": "Report failed validation",
                    "details": details,
                }
            }),
            ApiError::Internal(msg) => json!({
                "error": { "code": "INTERNAL_ERROR", "message": msg }
            }),
            ApiError::Store(err) => json!({
                "error": { "code": "STORE_ERROR", "message": err.to_string() }
            }),
            ApiError::Io(err) => json!({
                "error": { "code": "IO_ERROR", "message": err.to_string() }
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
