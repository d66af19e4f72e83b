use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// Invalid options, unknown storage backend, or a failed key/threshold/period resolution.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Transport failure while talking to an execution store.
    #[error("Storage error: {0}")]
    Storage(String),
    /// The job pipeline refused or failed to resubmit a deferred job.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

impl From<redis::RedisError> for ThrottlerError {
    fn from(err: redis::RedisError) -> Self {
        ThrottlerError::Storage(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ThrottlerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ThrottlerError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_throttler_error(err: &ThrottlerError) -> Self {
        match err {
            ThrottlerError::Configuration(msg) => Self::new("configuration_error", msg, 500),
            ThrottlerError::Storage(msg) => Self::new("service_unavailable", msg, 503),
            ThrottlerError::Pipeline(msg) => Self::new("pipeline_error", msg, 502),
            ThrottlerError::Validation(msg) => Self::new("validation_error", msg, 422),
            ThrottlerError::NotFound(msg) => Self::new("not_found", msg, 404),
            ThrottlerError::Internal(msg) => Self::new("internal_error", msg, 500),
        }
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_throttler_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_service_unavailable() {
        let body = ErrorResponse::from_throttler_error(&ThrottlerError::Storage(
            "connection reset".to_string(),
        ));
        assert_eq!(body.code, 503);
        assert_eq!(body.error, "service_unavailable");
        assert_eq!(body.message, "connection reset");
    }

    #[test]
    fn test_error_display() {
        let err = ThrottlerError::Configuration("unknown storage backend 'disk'".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown storage backend 'disk'"
        );
    }

    #[test]
    fn test_into_response_status() {
        let response = ThrottlerError::NotFound("no rule for worker".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
