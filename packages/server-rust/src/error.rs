//! HTTP-facing error type and the single failure path every route uses.
//!
//! Stages never write error responses themselves: they return an [`ApiError`]
//! and axum renders it through [`IntoResponse`]. Collaborator errors are
//! carried unchanged; the only reclassification in the request path is a
//! duplicate unique key on create, which the create handler turns into
//! [`ApiError::Conflict`] before it reaches this module.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use restkit_core::{ModelError, WorkflowError};
use serde::{Deserialize, Serialize};

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. `NOT_FOUND`, `CONFLICT`).
    pub code: String,
    pub message: String,
}

/// Errors that terminate a request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown resource, unknown entity, or a disabled operation.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate unique key on create.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed body or query parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Credentials required but absent.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials present but not accepted.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limit exceeded for `{0}`")]
    TooManyRequests(String),

    /// Request body above the configured size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Persistence error passed through from the model.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Workflow error passed through from the workflow engine.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// HTTP status code and machine-readable code for this error.
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::TooManyRequests(_) => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Model(err) | Self::Workflow(WorkflowError::Model(err)) => model_status(err),
            Self::Workflow(WorkflowError::MissingAction) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            Self::Workflow(WorkflowError::IllegalTransition { .. }) => {
                (StatusCode::CONFLICT, "ILLEGAL_TRANSITION")
            }
            Self::Workflow(WorkflowError::UnknownWorkflow(_)) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

/// Status of a model error that was passed through unclassified.
fn model_status(err: &ModelError) -> (StatusCode, &'static str) {
    match err {
        ModelError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ModelError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        ModelError::DuplicateKey { .. } | ModelError::Backend(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "An internal error occurred".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}
