//! Security utilities
//!
//! - `ssrf`: syntactic URL validation for user-supplied fetch targets
//! - secret redaction for configuration output
//! - log sanitisation so upstream error text never leaks provider keys

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

pub mod ssrf;

pub use ssrf::{SsrfError, SsrfProtection, ValidatedUrl, MAX_URL_LENGTH};

/// Redaction placeholder
pub const REDACTED_PLACEHOLDER: &str = "***REDACTED***";

/// Field names whose string values are always redacted (case-insensitive).
const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "apikey",
    "api_key",
    "token",
    "secret",
    "password",
    "credential",
    "credentials",
];

/// Patterns for secrets that can appear inside free-form text.
static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // API keys in query params (SerpApi takes its key this way)
        (
            Regex::new(r"(?i)([?&](api_?key|key|token)=)[^&\s]+").expect("static regex"),
            "${1}***REDACTED***",
        ),
        // Key headers echoed back in error text
        (
            Regex::new(r"(?i)((x-api-key|authorization):\s*)[^\s,]+").expect("static regex"),
            "${1}***REDACTED***",
        ),
        // JSON key fields
        (
            Regex::new(r##"(?i)("(?:apiKey|api_key|token|secret)":\s*")[^"]+"##)
                .expect("static regex"),
            "${1}***REDACTED***",
        ),
        // Anthropic API keys
        (
            Regex::new(r"sk-ant-[a-zA-Z0-9_-]{16,}").expect("static regex"),
            "***ANTHROPIC_KEY_REDACTED***",
        ),
    ]
});

fn is_sensitive_field_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_FIELD_NAMES.iter().any(|s| lower == *s || lower.ends_with(s))
}

/// Recursively redact sensitive string fields from a JSON value.
///
/// Only string values are replaced; `null` (an unset key) stays `null` so
/// `config show` still tells the operator whether a credential is present.
pub fn redact_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(key, val)| {
                    let val = if val.is_string() && is_sensitive_field_name(key) {
                        Value::String(REDACTED_PLACEHOLDER.to_string())
                    } else {
                        redact_secrets(val)
                    };
                    (key.clone(), val)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_secrets).collect()),
        _ => value.clone(),
    }
}

/// Sanitize free-form text (upstream error bodies, transport errors) before
/// it reaches the log.
pub fn sanitize_log(message: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(message.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

/// Truncate text for logging, on a char boundary.
pub fn truncate_for_log(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &message[..idx]),
        None => message.to_string(),
    }
}
