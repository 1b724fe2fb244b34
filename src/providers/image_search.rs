//! Image search provider
//!
//! SerpApi's `google_images` engine. Only the fields the suggestion
//! endpoint needs are decoded.

use serde::Deserialize;
use url::Url;

use super::{build_client, endpoint, log_upstream_failure, ProviderError};

/// One image search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    /// Small preview image, fetched and inlined by the gateway
    pub thumbnail: String,
    /// Full-resolution image, when the provider knows it
    pub original: Option<String>,
    /// Caption or page title, untrusted
    pub title: Option<String>,
}

/// Image search provider trait
#[async_trait::async_trait]
pub trait ImageSearchProvider: Send + Sync {
    /// Search for images, most relevant first.
    async fn search_images(&self, query: &str) -> Result<Vec<ImageCandidate>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    images_results: Vec<SerpApiImage>,
}

#[derive(Debug, Deserialize)]
struct SerpApiImage {
    thumbnail: Option<String>,
    original: Option<String>,
    title: Option<String>,
}

impl SerpApiResponse {
    fn into_candidates(self) -> Vec<ImageCandidate> {
        self.images_results
            .into_iter()
            .filter_map(|image| {
                let thumbnail = image.thumbnail.filter(|t| !t.trim().is_empty())?;
                Some(ImageCandidate {
                    thumbnail,
                    original: image.original.filter(|o| !o.trim().is_empty()),
                    title: image.title,
                })
            })
            .collect()
    }
}

/// SerpApi client
pub struct SerpApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for SerpApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SerpApiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    fn search_url(&self, query: &str) -> Result<Url, ProviderError> {
        Url::parse_with_params(
            &endpoint(&self.base_url, "search.json"),
            [
                ("engine", "google_images"),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ],
        )
        .map_err(|e| ProviderError::Transport(format!("invalid search URL: {e}")))
    }
}

#[async_trait::async_trait]
impl ImageSearchProvider for SerpApiClient {
    async fn search_images(&self, query: &str) -> Result<Vec<ImageCandidate>, ProviderError> {
        tracing::debug!(query, "image search");
        let response = self
            .client
            .get(self.search_url(query)?)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_upstream_failure("serpapi", status.as_u16(), &body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                detail: None,
            });
        }

        let parsed: SerpApiResponse = response.json().await.map_err(ProviderError::from_reqwest)?;
        Ok(parsed.into_candidates())
    }
}
