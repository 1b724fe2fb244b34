//! Per-route sliding-window rate limiter
//!
//! Each route keeps its own map of client identifier to the timestamps of
//! admitted requests inside the trailing window. State is in-process only
//! and resets on restart.
//!
//! There is no background eviction task. When a route's map grows past the
//! sweep threshold, the admitting call prunes every client whose window has
//! emptied.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitsConfig;

/// Rate-limited API routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    GenerateHotsheet,
    ProxyImage,
    RemoveBg,
    SuggestImages,
}

impl Route {
    pub const ALL: [Route; 4] = [
        Route::GenerateHotsheet,
        Route::ProxyImage,
        Route::RemoveBg,
        Route::SuggestImages,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Route::GenerateHotsheet => "generate-hotsheet",
            Route::ProxyImage => "proxy-image",
            Route::RemoveBg => "remove-bg",
            Route::SuggestImages => "suggest-images",
        }
    }

    fn limit(self, config: &RateLimitsConfig) -> usize {
        match self {
            Route::GenerateHotsheet => config.generate_hotsheet,
            Route::ProxyImage => config.proxy_image,
            Route::RemoveBg => config.remove_bg,
            Route::SuggestImages => config.suggest_images,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a check-and-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after_secs: u64 },
}

type ClientWindows = HashMap<String, VecDeque<Instant>>;

struct RouteState {
    limit: usize,
    clients: Mutex<ClientWindows>,
}

pub struct RateLimiter {
    window: Duration,
    sweep_threshold: usize,
    routes: HashMap<Route, RouteState>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("sweep_threshold", &self.sweep_threshold)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: &RateLimitsConfig) -> Self {
        let routes = Route::ALL
            .into_iter()
            .map(|route| {
                (
                    route,
                    RouteState {
                        limit: route.limit(config),
                        clients: Mutex::new(HashMap::new()),
                    },
                )
            })
            .collect();
        Self {
            window: config.window(),
            sweep_threshold: config.sweep_threshold,
            routes,
        }
    }

    /// Whole seconds a denied client should wait, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.window.as_millis() as u64;
        millis.div_ceil(1000)
    }

    /// Check and record a request made now.
    pub fn check(&self, route: Route, client: &str) -> Decision {
        self.check_at(route, client, Instant::now())
    }

    /// Check and record a request made at `now`.
    pub fn check_at(&self, route: Route, client: &str, now: Instant) -> Decision {
        let Some(state) = self.routes.get(&route) else {
            return Decision::Allow;
        };
        let window = self.window;
        let mut clients = state.clients.lock();

        let timestamps = clients.entry(client.to_string()).or_default();
        prune(timestamps, now, window);

        if timestamps.len() >= state.limit {
            return Decision::Deny {
                retry_after_secs: self.retry_after_secs(),
            };
        }
        timestamps.push_back(now);

        if clients.len() > self.sweep_threshold {
            let before = clients.len();
            clients.retain(|_, ts| {
                prune(ts, now, window);
                !ts.is_empty()
            });
            tracing::debug!(
                route = %route,
                before,
                after = clients.len(),
                "rate limiter sweep"
            );
        }

        Decision::Allow
    }

    /// Distinct clients currently tracked for a route.
    pub fn tracked_clients(&self, route: Route) -> usize {
        self.routes
            .get(&route)
            .map(|state| state.clients.lock().len())
            .unwrap_or(0)
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
