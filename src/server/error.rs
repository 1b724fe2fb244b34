//! HTTP error taxonomy
//!
//! Every failure a handler can surface is one `ApiError` variant. The
//! response body is always `{"error": "<message>"}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Malformed or missing client input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Cross-origin mutation attempt (403).
    #[error("Forbidden")]
    Forbidden,

    /// Local rate limiter denied the request (429 + Retry-After).
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    /// Declared or measured payload over its ceiling (413).
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Provider account quota exhausted (402).
    #[error("{0}")]
    QuotaExceeded(String),

    /// Provider rate-limited us (429, no Retry-After).
    #[error("{0}")]
    UpstreamRateLimited(String),

    /// Provider 4xx passed through with its own status.
    #[error("{message}")]
    UpstreamStatus { status: u16, message: String },

    /// Credential for this feature is not configured (501).
    #[error("{0}")]
    NotConfigured(String),

    /// Provider failure or unusable provider reply (502).
    #[error("{0}")]
    BadGateway(String),

    /// Outbound call exceeded its deadline (504).
    #[error("{0}")]
    Timeout(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } | ApiError::UpstreamRateLimited(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::QuotaExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::NotConfigured(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ApiError::Timeout(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
