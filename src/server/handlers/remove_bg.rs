//! `POST /api/remove-bg`

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::buffered_body;
use crate::deadline::with_deadline;
use crate::providers::ProviderError;
use crate::server::error::ApiError;
use crate::server::http::AppState;
use crate::server::ratelimit::Route;

/// Largest image forwarded to the provider, measured as decoded bytes.
pub const MAX_DECODED_BYTES: usize = 12_000_000;

const FAILED: &str = "Background removal failed";

static DATA_URI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^data:image/[a-z0-9.+-]+;base64,").expect("valid data URI regex")
});

#[derive(Debug, Deserialize)]
struct RemoveBgRequest {
    image_b64: String,
}

/// Drop a leading `data:image/<type>;base64,` if present.
pub fn strip_data_uri(input: &str) -> &str {
    match DATA_URI_PREFIX.find(input) {
        Some(m) => &input[m.end()..],
        None => input,
    }
}

/// Decoded size estimate `len * 3 / 4`, compared without rounding.
fn exceeds_decoded_limit(b64: &str) -> bool {
    b64.len().saturating_mul(3) > MAX_DECODED_BYTES.saturating_mul(4)
}

fn map_provider_error(err: ProviderError) -> ApiError {
    match err {
        ProviderError::Status { status: 402, .. } => {
            ApiError::QuotaExceeded("Monthly limit reached".into())
        }
        ProviderError::Status { status: 429, .. } => {
            ApiError::UpstreamRateLimited("Rate limited, try again later".into())
        }
        ProviderError::Status { status, detail } => {
            let message = detail.unwrap_or_else(|| FAILED.to_string());
            if status < 500 {
                ApiError::UpstreamStatus { status, message }
            } else {
                ApiError::BadGateway(message)
            }
        }
        ProviderError::Timeout => ApiError::timeout("Background removal timed out"),
        ProviderError::Transport(_) | ProviderError::Decode(_) => ApiError::bad_gateway(FAILED),
    }
}

pub async fn remove_bg(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    state.admit(Route::RemoveBg, &headers)?;

    let remover = state
        .background_remover()
        .ok_or_else(|| ApiError::NotConfigured("Background removal not configured".into()))?;

    let body = buffered_body(body)?;
    let request: RemoveBgRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Missing image_b64"))?;
    let raw = strip_data_uri(request.image_b64.trim());
    if raw.is_empty() {
        return Err(ApiError::bad_request("Missing image_b64"));
    }
    if exceeds_decoded_limit(raw) {
        return Err(ApiError::PayloadTooLarge("Image too large".into()));
    }

    let cancel = state.request_token();
    let started = Instant::now();
    let outcome = with_deadline(
        &cancel,
        state.timeouts().remove_bg(),
        remover.remove_background(raw),
    )
    .await;
    state.observe_upstream("remove.bg", started);

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "background removal failed");
            return Err(map_provider_error(err));
        }
        Err(interrupted) => {
            tracing::warn!(%interrupted, "background removal interrupted");
            return Err(ApiError::timeout("Background removal timed out"));
        }
    };

    Ok(Json(json!({
        "result_b64": format!("data:image/png;base64,{result}"),
    })))
}
