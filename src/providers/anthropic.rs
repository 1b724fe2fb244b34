//! Anthropic Messages API client
//!
//! Single-turn, non-streaming completions only.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{build_client, endpoint, log_upstream_failure, ProviderError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One system prompt plus one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

/// Content block of an assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Tool use, thinking, or anything newer than this client.
    #[serde(other)]
    Other,
}

/// LLM completion trait
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion and return the reply's content blocks in order.
    async fn complete(&self, request: &CompletionRequest)
        -> Result<Vec<ContentBlock>, ProviderError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Anthropic Claude client
pub struct AnthropicClient {
    client: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| ProviderError::Transport("API key is not a valid header value".into()))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: build_client()?,
            headers,
            base_url: base_url.into(),
            model: model.into(),
            max_tokens,
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.user,
            }],
        }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for AnthropicClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<ContentBlock>, ProviderError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "v1/messages"))
            .headers(self.headers.clone())
            .json(&self.body(request))
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_upstream_failure("anthropic", status.as_u16(), &body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                detail: None,
            });
        }

        let parsed: MessagesResponse =
            response.json().await.map_err(ProviderError::from_reqwest)?;
        Ok(parsed.content)
    }
}
