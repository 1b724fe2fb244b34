//! Prometheus metrics endpoint
//!
//! A small fixed set of counters and histograms rendered in the Prometheus
//! text exposition format. The registry is owned by `AppState`, so tests
//! get an isolated instance per router.

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;

use crate::server::http::AppState;

/// Upper bounds (seconds) for upstream latency buckets.
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cumulative histogram over fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [f64],
    /// One slot per bound plus `+Inf`.
    counts: Vec<AtomicU64>,
    /// f64 bits
    sum: AtomicU64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            counts: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            sum: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn observe(&self, value: f64) {
        let slot = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);

        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }

    pub fn count(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    fn render(&self, out: &mut String, name: &str, labels: &str) {
        let mut cumulative = 0;
        for (bound, count) in self.bounds.iter().zip(&self.counts) {
            cumulative += count.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "{name}_bucket{} {cumulative}",
                join_labels(labels, &format!("le=\"{bound}\""))
            );
        }
        let _ = writeln!(
            out,
            "{name}_bucket{} {}",
            join_labels(labels, "le=\"+Inf\""),
            self.count()
        );
        let braces = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{labels}}}")
        };
        let _ = writeln!(
            out,
            "{name}_sum{braces} {}",
            f64::from_bits(self.sum.load(Ordering::Relaxed))
        );
        let _ = writeln!(out, "{name}_count{braces} {}", self.count());
    }
}

/// Label-keyed family of metrics created on first use.
#[derive(Debug)]
struct Family<M> {
    label_names: &'static [&'static str],
    entries: RwLock<BTreeMap<Vec<String>, Arc<M>>>,
}

impl<M> Family<M> {
    fn new(label_names: &'static [&'static str]) -> Self {
        Self {
            label_names,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn get_or_create(&self, values: &[&str], make: impl FnOnce() -> M) -> Arc<M> {
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        if let Some(existing) = self.entries.read().get(&key) {
            return Arc::clone(existing);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(key).or_insert_with(|| Arc::new(make())))
    }

    fn labels(&self, values: &[String]) -> String {
        self.label_names
            .iter()
            .zip(values)
            .map(|(name, value)| format!("{name}=\"{}\"", escape_label(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Gateway metrics.
#[derive(Debug)]
pub struct GatewayMetrics {
    requests: Family<Counter>,
    rate_limited: Family<Counter>,
    ssrf_rejections: Family<Counter>,
    upstream_latency: Family<Histogram>,
    suggestions_emitted: Counter,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self {
            requests: Family::new(&["route", "status"]),
            rate_limited: Family::new(&["route"]),
            ssrf_rejections: Family::new(&["route"]),
            upstream_latency: Family::new(&["provider"]),
            suggestions_emitted: Counter::default(),
        }
    }
}

impl GatewayMetrics {
    pub fn record_request(&self, route: &str, status: u16) {
        self.requests
            .get_or_create(&[route, &status.to_string()], Counter::default)
            .inc();
    }

    pub fn record_rate_limited(&self, route: &str) {
        self.rate_limited.get_or_create(&[route], Counter::default).inc();
    }

    pub fn record_ssrf_rejection(&self, route: &str) {
        self.ssrf_rejections
            .get_or_create(&[route], Counter::default)
            .inc();
    }

    pub fn observe_upstream(&self, provider: &str, elapsed: Duration) {
        self.upstream_latency
            .get_or_create(&[provider], || Histogram::new(LATENCY_BUCKETS))
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_suggestion(&self) {
        self.suggestions_emitted.inc();
    }

    pub fn requests(&self, route: &str, status: u16) -> u64 {
        self.requests
            .entries
            .read()
            .get(&vec![route.to_string(), status.to_string()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Render everything in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(2048);

        render_counters(
            &mut out,
            "hotsheet_http_requests_total",
            "HTTP requests by route and status",
            &self.requests,
        );
        render_counters(
            &mut out,
            "hotsheet_rate_limited_total",
            "Requests rejected by the rate limiter",
            &self.rate_limited,
        );
        render_counters(
            &mut out,
            "hotsheet_ssrf_rejections_total",
            "URLs rejected by the SSRF guard",
            &self.ssrf_rejections,
        );

        let name = "hotsheet_upstream_duration_seconds";
        let _ = writeln!(out, "# HELP {name} Latency of third-party calls");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (values, histogram) in self.upstream_latency.entries.read().iter() {
            histogram.render(&mut out, name, &self.upstream_latency.labels(values));
        }

        let name = "hotsheet_suggestions_emitted_total";
        let _ = writeln!(out, "# HELP {name} Image suggestion records streamed");
        let _ = writeln!(out, "# TYPE {name} counter");
        let _ = writeln!(out, "{name} {}", self.suggestions_emitted.get());

        out
    }
}

fn render_counters(out: &mut String, name: &str, help: &str, family: &Family<Counter>) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    for (values, counter) in family.entries.read().iter() {
        let _ = writeln!(out, "{name}{{{}}} {}", family.labels(values), counter.get());
    }
}

fn join_labels(labels: &str, extra: &str) -> String {
    if labels.is_empty() {
        format!("{{{extra}}}")
    } else {
        format!("{{{labels},{extra}}}")
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics().render(),
    )
        .into_response()
}
