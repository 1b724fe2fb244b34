//! Request header helpers

use axum::http::HeaderMap;

/// Bucket shared by every client we cannot identify.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Trimmed, non-empty header value.
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First address of an `x-forwarded-for` chain.
fn parse_forwarded_for(value: Option<String>) -> Option<String> {
    let raw = value?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

/// Rate-limit key for the caller.
///
/// Uses the first `x-forwarded-for` entry, then `cf-connecting-ip`, then
/// [`UNKNOWN_CLIENT`]. The headers are taken at face value; the gateway is
/// expected to sit behind a proxy that sets them.
pub fn client_identifier(headers: &HeaderMap) -> String {
    parse_forwarded_for(header_value(headers, "x-forwarded-for"))
        .or_else(|| header_value(headers, "cf-connecting-ip"))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
