//! `POST /api/generate-hotsheet`
//!
//! The model's reply is relayed as-is once it parses as JSON. Schema
//! conformance is left to the caller.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{buffered_body, truncate_chars};
use crate::deadline::with_deadline;
use crate::providers::{CompletionRequest, ContentBlock, ProviderError};
use crate::security::truncate_for_log;
use crate::server::error::ApiError;
use crate::server::http::AppState;
use crate::server::ratelimit::Route;

const MAX_BRAND_CHARS: usize = 100;
const MAX_RETAILER_CHARS: usize = 50;

pub const SYSTEM_PROMPT: &str = r#"You are a brand research assistant for a retail buying team. Given a brand name and retailer, produce a structured "Hot Sheet" — a concise sell-in document used to pitch the brand internally.

Your output must be factual and non-promotional. Write like a buyer's analyst, not a marketer. Cite sources where possible. If you're uncertain about specific numbers (revenue, TikTok stats), say "estimated" or omit rather than fabricate.

Respond with valid JSON matching this exact schema (no markdown fences, just raw JSON):

{
  "whyItsHot": "2-4 sentence brand story. What the brand does, why it's trending, key differentiators.",
  "distribution": "Where the brand is currently sold (DTC, Amazon, other retailers). Mention comparable/competing brands. Include Amazon revenue estimates if known.",
  "listingInfo": {
    "leadTime": "Typical lead time (e.g. '6-8 weeks') or empty string if unknown",
    "minOrderValue": "Minimum order value (e.g. '$5K') or empty string if unknown",
    "maxOrderValue": "Maximum order value or empty string if unknown",
    "availableForDotcom": false,
    "link": ""
  },
  "pressFeatures": [
    { "text": "Quote or headline from a press feature", "source": "Publication name", "url": "URL if known, otherwise omit" }
  ],
  "viralTiktoks": [
    { "description": "Brief description of a viral TikTok video about the brand", "stats": "View/like count if known, e.g. '2.4M views'" }
  ],
  "topSkus": [
    { "name": "Product name", "msrp": 0.00, "offerPrice": 0.00, "rating": "e.g. '4.8 stars on Amazon'", "reviewHighlight": "Short notable review quote or fact" }
  ]
}

Guidelines:
- pressFeatures: Include 2-4 real press mentions if they exist. Cite actual publications.
- viralTiktoks: Include 1-3 if the brand has viral TikTok presence. Omit if none known.
- topSkus: Include 3-6 best-selling or most notable products. Use real MSRPs when known. Set offerPrice to 0 (the buyer will fill this in).
- listingInfo: Most fields will be unknown — use empty strings. These are buyer-specific details.
- Keep whyItsHot to 2-4 sentences max.
- Keep distribution to 2-3 sentences max."#;

static BRAND_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s&'.,\-]").expect("valid brand regex"));
static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*\s*").expect("valid fence regex"));
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("valid fence regex"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotsheetRequest {
    brand_name: String,
    retailer: String,
}

/// Keep word characters, whitespace and `&'.,-`; trim; cap at 100 chars.
pub fn sanitize_brand_name(raw: &str) -> String {
    let cleaned = BRAND_DISALLOWED.replace_all(raw, "");
    truncate_chars(cleaned.trim(), MAX_BRAND_CHARS).to_string()
}

/// Remove a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let start = FENCE_OPEN.find(trimmed).map_or(0, |m| m.end());
    let body = &trimmed[start..];
    let end = FENCE_CLOSE.find(body).map_or(body.len(), |m| m.start());
    &body[..end]
}

fn user_message(brand: &str, retailer: &str) -> String {
    let retailer_context = if retailer.is_empty() {
        String::new()
    } else {
        format!(" for {retailer}")
    };
    format!("Create a Hot Sheet for the brand \"{brand}\"{retailer_context}. Return only valid JSON.")
}

pub async fn generate_hotsheet(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    state.admit(Route::GenerateHotsheet, &headers)?;

    let llm = state.completions().ok_or_else(|| {
        ApiError::NotConfigured("AI generation not configured. Set ANTHROPIC_API_KEY.".into())
    })?;

    let body = buffered_body(body)?;
    let raw: Value =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid JSON"))?;
    let request: HotsheetRequest =
        serde_json::from_value(raw).map_err(|_| ApiError::bad_request("Invalid request"))?;

    let brand = sanitize_brand_name(&request.brand_name);
    if brand.is_empty() {
        return Err(ApiError::bad_request("Brand name is required"));
    }
    let retailer = truncate_chars(request.retailer.trim(), MAX_RETAILER_CHARS);

    let prompt = CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: user_message(&brand, retailer),
    };

    let cancel = state.request_token();
    let started = Instant::now();
    let outcome = with_deadline(&cancel, state.timeouts().llm(), llm.complete(&prompt)).await;
    state.observe_upstream("anthropic", started);

    let blocks = match outcome {
        Ok(Ok(blocks)) => blocks,
        Ok(Err(ProviderError::Timeout)) | Err(_) => {
            tracing::warn!(brand = %brand, "hot sheet generation timed out");
            return Err(ApiError::timeout("AI generation timed out"));
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "hot sheet generation failed");
            return Err(ApiError::bad_gateway("AI generation failed"));
        }
    };

    let Some(ContentBlock::Text { text }) = blocks.into_iter().next() else {
        return Err(ApiError::bad_gateway("Unexpected AI response format"));
    };

    let json_text = strip_code_fence(&text);
    let parsed: Value = serde_json::from_str(json_text).map_err(|e| {
        tracing::warn!(
            error = %e,
            excerpt = %truncate_for_log(json_text, 500),
            "model returned invalid JSON"
        );
        ApiError::bad_gateway("AI returned invalid JSON")
    })?;

    tracing::info!(brand = %brand, "hot sheet generated");
    Ok(Json(parsed))
}
