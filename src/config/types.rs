//! Typed configuration structures
//!
//! Every section has a `Default` carrying the production values, so an empty
//! config file (or none at all) yields a working gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,

    /// Logging
    pub logging: LoggingConfig,

    /// Per-route admission limits
    pub rate_limits: RateLimitsConfig,

    /// Outbound call timeouts
    pub timeouts: TimeoutsConfig,

    /// Third-party provider credentials and endpoints
    pub providers: ProvidersConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ValidationError::new("server.port", "must be non-zero"));
        }
        if self.server.bind.trim().is_empty() {
            errors.push(ValidationError::new("server.bind", "must not be empty"));
        }

        let limits = &self.rate_limits;
        if limits.window_ms == 0 {
            errors.push(ValidationError::new("rateLimits.windowMs", "must be > 0"));
        }
        for (path, value) in [
            ("rateLimits.generateHotsheet", limits.generate_hotsheet),
            ("rateLimits.proxyImage", limits.proxy_image),
            ("rateLimits.removeBg", limits.remove_bg),
            ("rateLimits.suggestImages", limits.suggest_images),
            ("rateLimits.sweepThreshold", limits.sweep_threshold),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "must be >= 1"));
            }
        }

        let t = &self.timeouts;
        for (path, value) in [
            ("timeouts.proxyImageMs", t.proxy_image_ms),
            ("timeouts.removeBgMs", t.remove_bg_ms),
            ("timeouts.searchMs", t.search_ms),
            ("timeouts.thumbnailMs", t.thumbnail_ms),
            ("timeouts.llmMs", t.llm_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "must be > 0"));
            }
        }

        if self.providers.llm_max_tokens == 0 {
            errors.push(ValidationError::new("providers.llmMaxTokens", "must be > 0"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,

    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Filter directive (error, warn, info, debug, trace, or a full
    /// `EnvFilter` string). `RUST_LOG` takes precedence.
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Sliding-window admission limits, one per route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitsConfig {
    /// Trailing window length in milliseconds
    pub window_ms: u64,

    /// Requests per window for `/api/generate-hotsheet`
    pub generate_hotsheet: usize,

    /// Requests per window for `/api/proxy-image`
    pub proxy_image: usize,

    /// Requests per window for `/api/remove-bg`
    pub remove_bg: usize,

    /// Requests per window for `/api/suggest-images`
    pub suggest_images: usize,

    /// Distinct clients per route before a full sweep of stale entries
    pub sweep_threshold: usize,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            generate_hotsheet: 3,
            proxy_image: 30,
            remove_bg: 5,
            suggest_images: 10,
            sweep_threshold: 1000,
        }
    }
}

impl RateLimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Outbound timeouts in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutsConfig {
    pub proxy_image_ms: u64,
    pub remove_bg_ms: u64,
    pub search_ms: u64,
    pub thumbnail_ms: u64,
    pub llm_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            proxy_image_ms: 8_000,
            remove_bg_ms: 30_000,
            search_ms: 10_000,
            thumbnail_ms: 3_000,
            llm_ms: 45_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn proxy_image(&self) -> Duration {
        Duration::from_millis(self.proxy_image_ms)
    }

    pub fn remove_bg(&self) -> Duration {
        Duration::from_millis(self.remove_bg_ms)
    }

    pub fn search(&self) -> Duration {
        Duration::from_millis(self.search_ms)
    }

    pub fn thumbnail(&self) -> Duration {
        Duration::from_millis(self.thumbnail_ms)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_millis(self.llm_ms)
    }
}

/// Provider credentials and endpoints
///
/// A missing key disables the corresponding endpoint (HTTP 501).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    /// Anthropic API key
    pub anthropic_api_key: Option<String>,

    /// Anthropic API base URL
    pub anthropic_base_url: String,

    /// Model used for Hot Sheet generation
    pub anthropic_model: String,

    /// Output token budget for Hot Sheet generation
    pub llm_max_tokens: u32,

    /// remove.bg API key
    pub removebg_api_key: Option<String>,

    /// remove.bg API base URL
    pub removebg_base_url: String,

    /// SerpApi key
    pub serpapi_key: Option<String>,

    /// SerpApi base URL
    pub serpapi_base_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            llm_max_tokens: 2048,
            removebg_api_key: None,
            removebg_base_url: "https://api.remove.bg".to_string(),
            serpapi_key: None,
            serpapi_base_url: "https://serpapi.com".to_string(),
        }
    }
}
