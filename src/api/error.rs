//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::ProcessingError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        let status = match &err {
            ProcessingError::NotFound => StatusCode::NOT_FOUND,
            ProcessingError::AccessDenied => StatusCode::FORBIDDEN,
            ProcessingError::AlreadyRunning => StatusCode::CONFLICT,
            ProcessingError::Validation(_) => StatusCode::PRECONDITION_FAILED,
            ProcessingError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProcessingError::Cancelled => StatusCode::CONFLICT,
            ProcessingError::Processing { .. } | ProcessingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_status_mapping() {
        let cases = [
            (ProcessingError::NotFound, StatusCode::NOT_FOUND),
            (ProcessingError::AccessDenied, StatusCode::FORBIDDEN),
            (ProcessingError::AlreadyRunning, StatusCode::CONFLICT),
            (
                ProcessingError::Validation("no audio".to_string()),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                ProcessingError::ServiceUnavailable {
                    step: "TRANSCRIBING",
                    message: "down".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            let api_err = ApiError::from(err);
            assert_eq!(api_err.status, expected);
        }
    }
}
