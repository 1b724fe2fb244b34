//! Background removal provider (remove.bg)

use serde::{Deserialize, Serialize};

use super::{build_client, endpoint, log_upstream_failure, ProviderError};

/// Output parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveBgOptions {
    pub size: &'static str,
    pub format: &'static str,
    pub channels: &'static str,
}

impl Default for RemoveBgOptions {
    fn default() -> Self {
        Self {
            size: "preview",
            format: "png",
            channels: "rgba",
        }
    }
}

/// Background removal trait
#[async_trait::async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from a raw base64 image (no `data:` prefix).
    ///
    /// Returns the provider's raw base64 PNG.
    async fn remove_background(&self, image_b64: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct RemoveBgRequest<'a> {
    image_file_b64: &'a str,
    #[serde(flatten)]
    options: &'a RemoveBgOptions,
}

#[derive(Debug, Deserialize)]
struct RemoveBgEnvelope {
    data: Option<RemoveBgData>,
}

#[derive(Debug, Deserialize)]
struct RemoveBgData {
    result_b64: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoveBgErrorEnvelope {
    #[serde(default)]
    errors: Vec<RemoveBgErrorItem>,
}

#[derive(Debug, Deserialize)]
struct RemoveBgErrorItem {
    detail: Option<String>,
}

/// Extract `data.result_b64`, treating absent or empty as a decode failure.
fn decode_success(body: &[u8]) -> Result<String, ProviderError> {
    let envelope: RemoveBgEnvelope = serde_json::from_slice(body)
        .map_err(|e| ProviderError::Decode(format!("remove.bg envelope: {e}")))?;
    envelope
        .data
        .and_then(|d| d.result_b64)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ProviderError::Decode("remove.bg reply has no result_b64".to_string()))
}

/// First `errors[].detail` of an error body, if any.
fn decode_error_detail(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<RemoveBgErrorEnvelope>(body)
        .unwrap_or_default()
        .errors
        .into_iter()
        .next()
        .and_then(|item| item.detail)
        .filter(|d| !d.trim().is_empty())
}

/// remove.bg API client
pub struct RemoveBgClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    options: RemoveBgOptions,
}

impl std::fmt::Debug for RemoveBgClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveBgClient")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RemoveBgClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            options: RemoveBgOptions::default(),
        })
    }
}

#[async_trait::async_trait]
impl BackgroundRemover for RemoveBgClient {
    async fn remove_background(&self, image_b64: &str) -> Result<String, ProviderError> {
        let request = RemoveBgRequest {
            image_file_b64: image_b64,
            options: &self.options,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "v1.0/removebg"))
            .header("X-Api-Key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        let body = response.bytes().await.map_err(ProviderError::from_reqwest)?;

        if !status.is_success() {
            log_upstream_failure("remove.bg", status.as_u16(), &String::from_utf8_lossy(&body));
            return Err(ProviderError::Status {
                status: status.as_u16(),
                detail: decode_error_detail(&body),
            });
        }

        decode_success(&body)
    }
}
