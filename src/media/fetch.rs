//! Outbound image fetching with size and type enforcement.
//!
//! [`UpstreamFetcher`] is the seam between the handlers and the network. The
//! production implementation, [`HttpFetcher`], never follows redirects: a
//! 3xx reply surfaces as a non-success status so a validated URL cannot be
//! bounced to an internal target.
//!
//! [`read_bounded`] consumes a body stream chunk by chunk and stops the
//! moment the running total passes the ceiling. The declared
//! `Content-Length` is checked first when present, but it is never trusted
//! on its own.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::security::{sanitize_log, ValidatedUrl};

/// Raster image types the gateway will relay.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Byte ceiling for `/api/proxy-image`.
pub const PROXY_MAX_BYTES: usize = 2_000_000;

/// Byte ceiling for each suggestion thumbnail.
pub const THUMBNAIL_MAX_BYTES: usize = 150_000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("hotsheet-gateway/", env!("CARGO_PKG_VERSION"));

/// Errors from fetching or reading an upstream image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    #[error("content type {0:?} is not an allowed image type")]
    NotAnImage(Option<String>),

    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(sanitize_log(&err.to_string()))
        }
    }
}

/// A streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Status line and headers of an upstream response, with the body unread.
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues a single GET against an already-validated URL.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn get(&self, url: &ValidatedUrl) -> Result<UpstreamResponse, FetchError>;
}

/// reqwest-backed fetcher with redirects disabled.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn get(&self, url: &ValidatedUrl) -> Result<UpstreamResponse, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "image/*")
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let headers = response.headers();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(UpstreamResponse {
            status: response.status().as_u16(),
            content_type,
            content_length,
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(FetchError::from_reqwest))
                .boxed(),
        })
    }
}

/// Normalise a `Content-Type` header and check it against the allowlist.
///
/// Parameters are stripped and the comparison is exact after lower-casing.
pub fn allowed_image_type(header: Option<&str>) -> Option<&'static str> {
    let essence = header?.split(';').next()?.trim().to_ascii_lowercase();
    ALLOWED_IMAGE_TYPES
        .iter()
        .copied()
        .find(|allowed| *allowed == essence)
}

/// Read a body stream into one buffer, failing as soon as more than `limit`
/// bytes have been seen.
///
/// On overflow or cancellation the stream is dropped before returning, which
/// for a network body closes the connection instead of draining it.
pub async fn read_bounded<S>(
    mut body: S,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Bytes, FetchError>
where
    S: Stream<Item = Result<Bytes, FetchError>> + Unpin,
{
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total: usize = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                drop(body);
                return Err(FetchError::Cancelled);
            }
            next = body.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        total = total.saturating_add(chunk.len());
        if total > limit {
            drop(body);
            return Err(FetchError::TooLarge { limit });
        }
        chunks.push(chunk);
    }

    Ok(match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => {
            let mut buf = BytesMut::with_capacity(total);
            for chunk in &chunks {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        }
    })
}

/// A fetched image whose type and size have been verified.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub content_type: &'static str,
    pub bytes: Bytes,
}

impl FetchedImage {
    /// Encode as a `data:` URI.
    pub fn to_data_url(&self) -> String {
        use base64::Engine;
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// GET an image and enforce status, content type, and size.
///
/// Checks run in order: 2xx status, allowlisted content type, declared
/// length, then streamed length.
pub async fn fetch_image(
    fetcher: &dyn UpstreamFetcher,
    url: &ValidatedUrl,
    max_bytes: usize,
    cancel: &CancellationToken,
) -> Result<FetchedImage, FetchError> {
    let response = fetcher.get(url).await?;

    if !(200..300).contains(&response.status) {
        return Err(FetchError::UpstreamStatus(response.status));
    }

    let content_type = allowed_image_type(response.content_type.as_deref())
        .ok_or_else(|| FetchError::NotAnImage(response.content_type.clone()))?;

    if let Some(declared) = response.content_length {
        if declared > max_bytes as u64 {
            return Err(FetchError::TooLarge { limit: max_bytes });
        }
    }

    let bytes = read_bounded(response.body, max_bytes, cancel).await?;
    Ok(FetchedImage {
        content_type,
        bytes,
    })
}
