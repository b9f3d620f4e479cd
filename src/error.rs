//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Authentication Errors**: missing, invalid, expired or revoked credentials
/// - **Throttling Errors**: one-time-code issuance over its hourly budget
/// - **Resource Errors**: API key not found or owned by someone else
/// - **Validation Errors**: malformed request data
/// - **Upstream Errors**: email delivery, captcha or tool backend failures
/// - **Store Errors**: anything coming out of the durable store
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Credential is missing, malformed, expired, revoked or of the wrong kind.
    ///
    /// Returns HTTP 401 Unauthorized. The message is identical for every
    /// cause so callers cannot probe which check failed.
    #[error("Unauthorized")]
    Unauthorized,

    /// Too many one-time codes were requested for one email address.
    ///
    /// Returns HTTP 429 Too Many Requests.
    #[error("Too many requests. Please try again later.")]
    RateLimited,

    /// Requested resource does not exist or doesn't belong to the caller.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Not found")]
    NotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    Validation(String),

    /// A collaborator (mailer, captcha, tool backend) failed.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Durable store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Any other server-side failure (e.g. corrupt key material).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Unauthorized` → 401 Unauthorized
/// - `RateLimited` → 429 Too Many Requests
/// - `NotFound` → 404 Not Found
/// - `Validation` → 400 Bad Request
/// - `Upstream` → 502 Bad Gateway
/// - `Store` / `Internal` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                self.to_string(),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Upstream(ref detail) => {
                tracing::error!("Upstream failure: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_failure",
                    "An upstream service failed".to_string(),
                )
            }
            AppError::Store(ref e) => {
                tracing::error!("Store failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref detail) => {
                tracing::error!("Internal failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
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
