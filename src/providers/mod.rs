//! Third-party service providers
//!
//! One trait per capability so handlers can be driven by fakes in tests:
//!
//! - [`ImageSearchProvider`]: image search (SerpApi)
//! - [`BackgroundRemover`]: background removal (remove.bg)
//! - [`CompletionProvider`]: single-turn LLM completion (Anthropic)
//!
//! Wire JSON is decoded into typed envelopes at this boundary; nothing
//! untyped escapes to the handlers.

use std::time::Duration;

use thiserror::Error;

use crate::security::{sanitize_log, truncate_for_log};

pub mod anthropic;
pub mod image_search;
pub mod remove_bg;

pub use anthropic::{AnthropicClient, CompletionProvider, CompletionRequest, ContentBlock};
pub use image_search::{ImageCandidate, ImageSearchProvider, SerpApiClient};
pub use remove_bg::{BackgroundRemover, RemoveBgClient, RemoveBgOptions};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest provider error body kept for logs.
const ERROR_BODY_LOG_CHARS: usize = 500;

/// Provider call errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Non-2xx reply. `detail` is the provider's own message when it sent one.
    #[error("provider returned HTTP {status}")]
    Status { status: u16, detail: Option<String> },

    #[error("provider request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    /// 2xx reply that does not match the expected envelope.
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(sanitize_log(&err.to_string()))
        } else {
            ProviderError::Transport(sanitize_log(&err.to_string()))
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Shared client settings for provider APIs.
pub(crate) fn build_client() -> Result<reqwest::Client, ProviderError> {
    // x-api-key is not stripped on redirect; never follow one.
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("hotsheet-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Log a failed provider reply without leaking credentials.
pub(crate) fn log_upstream_failure(provider: &'static str, status: u16, body: &str) {
    tracing::warn!(
        provider,
        status,
        body = %truncate_for_log(&sanitize_log(body), ERROR_BODY_LOG_CHARS),
        "provider request failed"
    );
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
