//! `POST /api/suggest-images`
//!
//! One search call, then a small worker pool fetches candidate thumbnails
//! and streams each one that passes the type and size checks as a line of
//! NDJSON. Failed thumbnails are skipped silently. The body ends when the
//! workers stop, either because the target count was reached or the
//! candidate queue ran dry.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{buffered_body, truncate_chars};
use crate::deadline::with_deadline;
use crate::media::{fetch_image, UpstreamFetcher, THUMBNAIL_MAX_BYTES};
use crate::providers::{ImageCandidate, ProviderError};
use crate::security::SsrfProtection;
use crate::server::error::ApiError;
use crate::server::http::AppState;
use crate::server::ratelimit::Route;

/// Concurrent thumbnail fetchers per request.
pub const SUGGESTION_WORKERS: usize = 3;

/// Candidates taken from the search results.
pub const SUGGESTION_CANDIDATES: usize = 20;

/// Records emitted before the workers stop.
pub const SUGGESTION_TARGET: usize = 15;

const MIN_QUERY_CHARS: usize = 3;
const MAX_QUERY_CHARS: usize = 200;
const MAX_TITLE_CHARS: usize = 200;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static HTML_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);")
            .expect("valid entity regex")
    });
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Deserialize)]
struct SuggestRequest {
    query: String,
}

/// One streamed suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSuggestion {
    pub data_url: String,
    pub original_url: String,
    pub title: String,
}

/// Strip markup from an untrusted caption.
pub fn sanitize_title(raw: &str) -> String {
    let without_tags = HTML_TAG.replace_all(raw, "");
    let without_entities = HTML_ENTITY.replace_all(&without_tags, " ");
    let collapsed = WHITESPACE.replace_all(&without_entities, " ");
    truncate_chars(collapsed.trim(), MAX_TITLE_CHARS).to_string()
}

/// Bounded fan-out over search candidates.
#[derive(Debug, Clone)]
pub struct SuggestionPipeline {
    pub workers: usize,
    pub target: usize,
    pub thumbnail_timeout: Duration,
    pub max_bytes: usize,
}

impl SuggestionPipeline {
    pub fn new(thumbnail_timeout: Duration) -> Self {
        Self {
            workers: SUGGESTION_WORKERS,
            target: SUGGESTION_TARGET,
            thumbnail_timeout,
            max_bytes: THUMBNAIL_MAX_BYTES,
        }
    }

    /// Start the workers. Records arrive on the returned channel, which
    /// closes once every worker has stopped. `state`, when given, receives
    /// the suggestion and rejection counts.
    pub fn spawn(
        &self,
        candidates: Vec<ImageCandidate>,
        fetcher: Arc<dyn UpstreamFetcher>,
        state: Option<AppState>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ImageSuggestion> {
        let (tx, rx) = mpsc::channel(self.target.max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(candidates)));
        let emitted = Arc::new(AtomicUsize::new(0));

        for worker in 0..self.workers {
            let ctx = WorkerContext {
                id: worker,
                pipeline: self.clone(),
                queue: Arc::clone(&queue),
                emitted: Arc::clone(&emitted),
                fetcher: Arc::clone(&fetcher),
                state: state.clone(),
                cancel: cancel.clone(),
                tx: tx.clone(),
            };
            tokio::spawn(ctx.run());
        }

        rx
    }
}

struct WorkerContext {
    id: usize,
    pipeline: SuggestionPipeline,
    queue: Arc<Mutex<VecDeque<ImageCandidate>>>,
    emitted: Arc<AtomicUsize>,
    fetcher: Arc<dyn UpstreamFetcher>,
    state: Option<AppState>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ImageSuggestion>,
}

impl WorkerContext {
    async fn run(self) {
        let target = self.pipeline.target;
        loop {
            if self.cancel.is_cancelled() || self.emitted.load(Ordering::Acquire) >= target {
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some(candidate) = next else {
                break;
            };

            let Some(suggestion) = self.fetch_candidate(candidate).await else {
                continue;
            };

            // Reserve a slot; whoever lands past the target discards.
            if self.emitted.fetch_add(1, Ordering::AcqRel) >= target {
                break;
            }
            if self.tx.send(suggestion).await.is_err() {
                break;
            }
            if let Some(state) = &self.state {
                state.metrics().record_suggestion();
            }
        }
        tracing::trace!(worker = self.id, "suggestion worker finished");
    }

    async fn fetch_candidate(&self, candidate: ImageCandidate) -> Option<ImageSuggestion> {
        let url = match SsrfProtection::validate_url(&candidate.thumbnail) {
            Ok(url) => url,
            Err(err) => {
                if let Some(state) = &self.state {
                    state
                        .metrics()
                        .record_ssrf_rejection(Route::SuggestImages.as_str());
                }
                tracing::debug!(error = %err, "thumbnail URL rejected");
                return None;
            }
        };

        let outcome = with_deadline(
            &self.cancel,
            self.pipeline.thumbnail_timeout,
            fetch_image(
                self.fetcher.as_ref(),
                &url,
                self.pipeline.max_bytes,
                &self.cancel,
            ),
        )
        .await;

        let image = match outcome {
            Ok(Ok(image)) => image,
            Ok(Err(err)) => {
                tracing::debug!(host = %url.host(), error = %err, "thumbnail skipped");
                return None;
            }
            Err(interrupted) => {
                tracing::debug!(host = %url.host(), %interrupted, "thumbnail skipped");
                return None;
            }
        };

        Some(ImageSuggestion {
            data_url: image.to_data_url(),
            original_url: candidate
                .original
                .unwrap_or_else(|| candidate.thumbnail.clone()),
            title: sanitize_title(candidate.title.as_deref().unwrap_or_default()),
        })
    }
}

fn validate_query(raw: &str) -> Result<&str, ApiError> {
    let query = raw.trim();
    let len = query.chars().count();
    if !(MIN_QUERY_CHARS..=MAX_QUERY_CHARS).contains(&len) {
        return Err(ApiError::bad_request("Query too short or too long"));
    }
    Ok(query)
}

fn map_search_error(err: ProviderError) -> ApiError {
    match err {
        ProviderError::Timeout => ApiError::timeout("Search timed out"),
        _ => ApiError::bad_gateway("Search failed"),
    }
}

pub async fn suggest_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    state.admit(Route::SuggestImages, &headers)?;

    let search = state
        .image_search()
        .ok_or_else(|| ApiError::NotConfigured("Image search not configured".into()))?;

    let body = buffered_body(body)?;
    let request: SuggestRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid request"))?;
    let query = validate_query(&request.query)?;

    let cancel = state.request_token();
    let started = Instant::now();
    let outcome = with_deadline(&cancel, state.timeouts().search(), search.search_images(query)).await;
    state.observe_upstream("serpapi", started);

    let mut candidates = match outcome {
        Ok(Ok(candidates)) => candidates,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "image search failed");
            return Err(map_search_error(err));
        }
        Err(interrupted) => {
            tracing::warn!(%interrupted, "image search interrupted");
            return Err(ApiError::timeout("Search timed out"));
        }
    };
    candidates.truncate(SUGGESTION_CANDIDATES);
    tracing::debug!(candidates = candidates.len(), "fetching thumbnails");

    let pipeline = SuggestionPipeline::new(state.timeouts().thumbnail());
    let mut rx = pipeline.spawn(
        candidates,
        state.shared_fetcher(),
        Some(state.clone()),
        cancel.clone(),
    );

    // Dropping the body (client gone) cancels the workers.
    let guard = cancel.drop_guard();
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(suggestion) = rx.recv().await {
            match serde_json::to_vec(&suggestion) {
                Ok(mut line) => {
                    line.push(b'\n');
                    yield Ok::<_, Infallible>(Bytes::from(line));
                }
                Err(err) => tracing::warn!(error = %err, "failed to encode suggestion"),
            }
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
