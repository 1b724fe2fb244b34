//! HTTP server
//!
//! Router, shared state, per-request observation, and the serve loop.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, MatchedPath, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::csrf::origin_guard;
use super::error::ApiError;
use super::handlers;
use super::headers::client_identifier;
use super::metrics::{metrics_handler, GatewayMetrics};
use super::ratelimit::{Decision, RateLimiter, Route};
use crate::config::{Config, TimeoutsConfig};
use crate::media::{HttpFetcher, UpstreamFetcher};
use crate::providers::{
    AnthropicClient, BackgroundRemover, CompletionProvider, ImageSearchProvider, RemoveBgClient,
    SerpApiClient,
};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request body ceiling for `/api/remove-bg`: a base64 image at the decoded
/// limit plus its JSON envelope. Other routes keep axum's 2 MB default.
pub const REMOVE_BG_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Server start-up and runtime errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address {addr}: {message}")]
    BindAddress { addr: String, message: String },

    #[error("failed to initialize {component}: {message}")]
    Init {
        component: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

struct AppStateInner {
    timeouts: TimeoutsConfig,
    limiter: RateLimiter,
    metrics: GatewayMetrics,
    fetcher: Arc<dyn UpstreamFetcher>,
    image_search: Option<Arc<dyn ImageSearchProvider>>,
    background_remover: Option<Arc<dyn BackgroundRemover>>,
    completions: Option<Arc<dyn CompletionProvider>>,
    shutdown: CancellationToken,
}

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("limiter", &self.inner.limiter)
            .field("image_search", &self.inner.image_search.is_some())
            .field("background_remover", &self.inner.background_remover.is_some())
            .field("completions", &self.inner.completions.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`]. Providers left unset answer 501.
pub struct AppStateBuilder {
    config: Config,
    fetcher: Arc<dyn UpstreamFetcher>,
    image_search: Option<Arc<dyn ImageSearchProvider>>,
    background_remover: Option<Arc<dyn BackgroundRemover>>,
    completions: Option<Arc<dyn CompletionProvider>>,
    shutdown: CancellationToken,
}

impl AppStateBuilder {
    pub fn image_search(mut self, provider: Arc<dyn ImageSearchProvider>) -> Self {
        self.image_search = Some(provider);
        self
    }

    pub fn background_remover(mut self, provider: Arc<dyn BackgroundRemover>) -> Self {
        self.background_remover = Some(provider);
        self
    }

    pub fn completions(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completions = Some(provider);
        self
    }

    /// Token whose cancellation aborts every in-flight outbound call.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> AppState {
        AppState {
            inner: Arc::new(AppStateInner {
                timeouts: self.config.timeouts.clone(),
                limiter: RateLimiter::new(&self.config.rate_limits),
                metrics: GatewayMetrics::default(),
                fetcher: self.fetcher,
                image_search: self.image_search,
                background_remover: self.background_remover,
                completions: self.completions,
                shutdown: self.shutdown,
            }),
        }
    }
}

impl AppState {
    pub fn builder(config: &Config, fetcher: Arc<dyn UpstreamFetcher>) -> AppStateBuilder {
        AppStateBuilder {
            config: config.clone(),
            fetcher,
            image_search: None,
            background_remover: None,
            completions: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Production state: real HTTP clients for every configured provider.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self, ServerError> {
        let fetcher = HttpFetcher::new().map_err(|e| ServerError::Init {
            component: "image fetcher",
            message: e.to_string(),
        })?;
        let providers = &config.providers;
        let mut builder = Self::builder(config, Arc::new(fetcher)).shutdown_token(shutdown);

        if let Some(key) = &providers.serpapi_key {
            let client = SerpApiClient::new(key.as_str(), providers.serpapi_base_url.as_str())
                .map_err(|e| ServerError::Init {
                    component: "serpapi client",
                    message: e.to_string(),
                })?;
            builder = builder.image_search(Arc::new(client));
        }
        if let Some(key) = &providers.removebg_api_key {
            let client = RemoveBgClient::new(key.as_str(), providers.removebg_base_url.as_str())
                .map_err(|e| ServerError::Init {
                    component: "remove.bg client",
                    message: e.to_string(),
                })?;
            builder = builder.background_remover(Arc::new(client));
        }
        if let Some(key) = &providers.anthropic_api_key {
            let client = AnthropicClient::new(
                key,
                providers.anthropic_base_url.as_str(),
                providers.anthropic_model.as_str(),
                providers.llm_max_tokens,
            )
            .map_err(|e| ServerError::Init {
                component: "anthropic client",
                message: e.to_string(),
            })?;
            builder = builder.completions(Arc::new(client));
        }

        let state = builder.build();
        tracing::info!(
            image_search = state.inner.image_search.is_some(),
            background_removal = state.inner.background_remover.is_some(),
            ai_generation = state.inner.completions.is_some(),
            "providers configured"
        );
        Ok(state)
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.inner.timeouts
    }

    pub fn fetcher(&self) -> &dyn UpstreamFetcher {
        self.inner.fetcher.as_ref()
    }

    pub fn shared_fetcher(&self) -> Arc<dyn UpstreamFetcher> {
        Arc::clone(&self.inner.fetcher)
    }

    pub fn image_search(&self) -> Option<&dyn ImageSearchProvider> {
        self.inner.image_search.as_deref()
    }

    pub fn background_remover(&self) -> Option<&dyn BackgroundRemover> {
        self.inner.background_remover.as_deref()
    }

    pub fn completions(&self) -> Option<&dyn CompletionProvider> {
        self.inner.completions.as_deref()
    }

    /// Cancellation scope for one request's outbound work.
    pub fn request_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Check-and-record against the route's limit.
    pub fn admit(&self, route: Route, headers: &axum::http::HeaderMap) -> Result<(), ApiError> {
        let client = client_identifier(headers);
        match self.inner.limiter.check(route, &client) {
            Decision::Allow => Ok(()),
            Decision::Deny { retry_after_secs } => {
                self.inner.metrics.record_rate_limited(route.as_str());
                tracing::info!(route = %route, client = %client, "rate limit exceeded");
                Err(ApiError::RateLimited { retry_after_secs })
            }
        }
    }

    /// Record the latency of one provider call.
    pub fn observe_upstream(&self, provider: &str, started: Instant) {
        self.inner.metrics.observe_upstream(provider, started.elapsed());
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/generate-hotsheet", post(handlers::generate_hotsheet))
        .route("/proxy-image", post(handlers::proxy_image))
        .route(
            "/remove-bg",
            post(handlers::remove_bg).layer(DefaultBodyLimit::max(REMOVE_BG_BODY_LIMIT)),
        )
        .route("/suggest-images", post(handlers::suggest_images))
        .layer(middleware::from_fn(origin_guard));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), observe_request))
        .with_state(state)
}

/// Request span, `x-request-id`, and the request counter.
async fn observe_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let started = Instant::now();
        let mut response = next.run(request).await;
        let status = response.status().as_u16();

        state.metrics().record_request(&route, status);
        tracing::debug!(status, elapsed_ms = started.elapsed().as_millis() as u64, "request finished");

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

/// `GET /health`
async fn health_handler() -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}

/// Parse `bind:port` into a socket address.
pub fn socket_addr(bind: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let host = bind.trim();
    let candidate = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse()
        .map_err(|e: std::net::AddrParseError| ServerError::BindAddress {
            addr: candidate.clone(),
            message: e.to_string(),
        })
}

/// How long in-flight requests get after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Bind and serve until `shutdown` is cancelled.
///
/// Connections drain for a grace period after cancellation; the state's
/// outbound calls are cancelled through the same token.
pub async fn serve(
    config: &Config,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = socket_addr(&config.server.bind, config.server.port)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "HTTP server listening");

    let app = build_router(state);
    let graceful = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!(grace = ?SHUTDOWN_GRACE, "shutdown grace period elapsed, dropping connections");
        }
    }

    tracing::info!("HTTP server stopped");
    Ok(())
}
