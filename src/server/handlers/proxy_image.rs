//! `POST /api/proxy-image`

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::buffered_body;
use crate::deadline::with_deadline;
use crate::media::{fetch_image, FetchError, PROXY_MAX_BYTES};
use crate::security::SsrfProtection;
use crate::server::error::ApiError;
use crate::server::http::AppState;
use crate::server::ratelimit::Route;

const CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
struct ProxyImageRequest {
    url: String,
}

fn map_fetch_error(err: FetchError) -> ApiError {
    match err {
        FetchError::UpstreamStatus(_) => ApiError::bad_gateway("Upstream error"),
        FetchError::NotAnImage(_) => ApiError::bad_request("Not an image"),
        FetchError::TooLarge { .. } => ApiError::PayloadTooLarge("Image too large".into()),
        FetchError::Timeout | FetchError::Cancelled => ApiError::timeout("Fetch timed out"),
        FetchError::Transport(_) => ApiError::bad_gateway("Fetch failed"),
    }
}

pub async fn proxy_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let route = Route::ProxyImage;
    state.admit(route, &headers)?;

    let body = buffered_body(body)?;
    let request: ProxyImageRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Missing url"))?;

    let url = SsrfProtection::validate_url(&request.url).map_err(|err| {
        state.metrics().record_ssrf_rejection(route.as_str());
        tracing::info!(route = %route, error = %err, "proxy URL rejected");
        ApiError::bad_request("Invalid URL")
    })?;

    let cancel = state.request_token();
    let started = Instant::now();
    let outcome = with_deadline(
        &cancel,
        state.timeouts().proxy_image(),
        fetch_image(state.fetcher(), &url, PROXY_MAX_BYTES, &cancel),
    )
    .await;
    state.observe_upstream("image-host", started);

    let image = match outcome {
        Ok(Ok(image)) => image,
        Ok(Err(err)) => {
            tracing::debug!(host = %url.host(), error = %err, "proxy fetch failed");
            return Err(map_fetch_error(err));
        }
        Err(interrupted) => {
            tracing::debug!(host = %url.host(), %interrupted, "proxy fetch interrupted");
            return Err(ApiError::timeout("Fetch timed out"));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, image.content_type),
            (header::CACHE_CONTROL, CACHE_CONTROL),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        image.bytes,
    )
        .into_response())
}
