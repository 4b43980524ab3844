use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::PageError;
use crate::pipeline::orchestrator::RunError;
use crate::pipeline::review::ReviewError;
use crate::pipeline::state::TransitionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A pipeline phase failed; the session has already been reverted.
    /// Carries the classified, user-facing message.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::Conflict(e.to_string())
    }
}

impl From<ReviewError> for AppError {
    fn from(e: ReviewError) -> Self {
        AppError::NotFound(e.to_string())
    }
}

impl From<PageError> for AppError {
    fn from(e: PageError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Transition(e) => e.into(),
            RunError::Pipeline(e) => AppError::Pipeline(e.user_message()),
            RunError::Aborted(e) => AppError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone()),
            AppError::Pipeline(msg) => {
                tracing::warn!("Pipeline error: {msg}");
                (StatusCode::BAD_GATEWAY, "PIPELINE_ERROR", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
