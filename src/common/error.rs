use crate::common::response::ApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;
use validator::ValidationErrors;

/// Failures surfaced by the conversion pipeline and the queue.
///
/// Every variant renders as readable text; the HTTP layer maps each one to a
/// status code through [`AppError::status_code`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    ResourceLimitExceeded(String),

    #[error("Download failed: {0}")]
    ExternalToolFailure(String),

    #[error("External tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("{0}")]
    ToolNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ResourceLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalToolFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Filesystem(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ToolNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short machine-readable name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::ResourceLimitExceeded(_) => "resource_limit_exceeded",
            AppError::ExternalToolFailure(_) => "external_tool_failure",
            AppError::Timeout(_) => "timeout",
            AppError::Filesystem(_) => "filesystem",
            AppError::ToolNotFound(_) => "tool_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Cancelled => "cancelled",
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());
        AppError::InvalidInput(message)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err.to_string(), err.status_code())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
