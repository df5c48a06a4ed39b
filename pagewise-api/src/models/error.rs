use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pagewise_core::{ContextError, StorageError};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Request cancelled")]
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Validation(msg) => ApiError::BadRequest(msg),
            ContextError::NotFound(what) => ApiError::NotFound(what),
            ContextError::Conflict { key } => {
                ApiError::Conflict(format!("a newer value is stored for {key}"))
            },
            ContextError::Timeout { millis } => ApiError::Timeout(format!("after {millis}ms")),
            ContextError::Provider { status: 429, message } => ApiError::RateLimit(message),
            ContextError::Provider { status, message } => {
                ApiError::ServiceUnavailable(format!("provider returned {status}: {message}"))
            },
            ContextError::Network(msg) => ApiError::ServiceUnavailable(msg),
            ContextError::Storage(StorageError::QuotaExceeded { used, limit }) => {
                ApiError::QuotaExceeded(format!("{used} of {limit} bytes"))
            },
            ContextError::Storage(e) => ApiError::ServiceUnavailable(e.to_string()),
            ContextError::Cancelled => ApiError::Cancelled,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            ApiError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                Some("invalid_json"),
            ),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error", None),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict_error", Some("conflict")),
            ApiError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout_error",
                Some("timeout"),
            ),
            ApiError::RateLimit(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                Some("rate_limit_exceeded"),
            ),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", None)
            },
            ApiError::QuotaExceeded(_) => (
                StatusCode::INSUFFICIENT_STORAGE,
                "storage_error",
                Some("quota_exceeded"),
            ),
            ApiError::Cancelled => (
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
                "cancelled",
                None,
            ),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                param: None,
                code: code.map(String::from),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_statuses() {
        let cases = [
            (ContextError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ContextError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ContextError::Conflict { key: "mode".into() },
                StatusCode::CONFLICT,
            ),
            (
                ContextError::Provider {
                    status: 429,
                    message: "slow down".into(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ContextError::Storage(StorageError::QuotaExceeded { used: 2, limit: 1 }),
                StatusCode::INSUFFICIENT_STORAGE,
            ),
            (
                ContextError::Summarization("empty".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
