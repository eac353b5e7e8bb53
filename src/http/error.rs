//! JSON error responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The caller exhausted its admission budget for the current window
    #[error("Too many requests. Please try again later.")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// No route matched
    #[error("Endpoint not found")]
    NotFound { path: String },
}

/// Body shared by every error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Always `false` for errors.
    pub success: bool,
    /// Human readable description.
    pub message: String,
    /// Seconds until the caller may retry. Only set when rate limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// The unmatched request path. Only set for 404s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        match self {
            ApiError::RateLimitExceeded { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(ErrorBody {
                    success: false,
                    message,
                    retry_after: Some(retry_after_secs),
                    path: None,
                }),
            )
                .into_response(),
            ApiError::NotFound { path } => (
                status,
                Json(ErrorBody {
                    success: false,
                    message,
                    retry_after: None,
                    path: Some(path),
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_body() {
        let body = ErrorBody {
            success: false,
            message: ApiError::RateLimitExceeded { retry_after_secs: 12 }.to_string(),
            retry_after: Some(12),
            path: None,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "message": "Too many requests. Please try again later.",
                "retryAfter": 12
            })
        );
    }

    #[test]
    fn test_rate_limit_response_headers() {
        let response = ApiError::RateLimitExceeded { retry_after_secs: 30 }.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }

    #[test]
    fn test_not_found_status() {
        let err = ApiError::NotFound {
            path: "/nope".to_string(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
