//! API route handlers
//!
//! Every handler follows the same order: rate limiter, provider
//! configuration (501), body validation, then outbound calls. Bodies are
//! taken as raw bytes so each endpoint controls its own 400 message, and a
//! body over the route's limit still gets a JSON 413 after admission.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};

use crate::server::error::ApiError;

mod hotsheet;
mod proxy_image;
mod remove_bg;
mod suggest_images;

pub use hotsheet::{generate_hotsheet, sanitize_brand_name, strip_code_fence, SYSTEM_PROMPT};
pub use proxy_image::proxy_image;
pub use remove_bg::{remove_bg, strip_data_uri, MAX_DECODED_BYTES};
pub use suggest_images::{
    sanitize_title, suggest_images, ImageSuggestion, SuggestionPipeline, SUGGESTION_CANDIDATES,
    SUGGESTION_TARGET, SUGGESTION_WORKERS,
};

/// Unwrap a buffered request body, mapping a rejected one to `ApiError`.
pub(crate) fn buffered_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, ApiError> {
    body.map_err(|rejection| match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            tracing::info!("request body over limit");
            ApiError::PayloadTooLarge("Request too large".into())
        }
        other => {
            tracing::debug!(error = %other, "failed to read request body");
            ApiError::bad_request("Invalid request")
        }
    })
}

/// First `max` chars of `s`.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::extract::DefaultBodyLimit;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    async fn echo_len(body: Result<Bytes, BytesRejection>) -> Result<String, ApiError> {
        buffered_body(body).map(|bytes| bytes.len().to_string())
    }

    #[tokio::test]
    async fn test_buffered_body_limit_is_json_413() {
        let app = Router::new()
            .route("/", post(echo_len))
            .layer(DefaultBodyLimit::max(8));

        let request = |n: usize| {
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from(vec![b'a'; n]))
                .unwrap()
        };

        let response = app.clone().oneshot(request(8)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request(9)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Request too large");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 3), "hi");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
