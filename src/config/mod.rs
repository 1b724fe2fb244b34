//! Configuration loading
//!
//! Precedence, lowest first: built-in defaults, an optional JSON5 file, then
//! environment variables. Provider keys are normally supplied only through
//! the environment.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

pub mod types;

pub use types::{
    Config, LogFormat, LoggingConfig, ProvidersConfig, RateLimitsConfig, ServerConfig,
    TimeoutsConfig, ValidationError,
};

/// Environment variable naming the config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "HOTSHEET_CONFIG";

const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
const ENV_REMOVEBG_KEY: &str = "REMOVEBG_API_KEY";
const ENV_SERPAPI_KEY: &str = "SERPAPI_KEY";
const ENV_BIND: &str = "HOTSHEET_BIND";
const ENV_PORT: &str = "HOTSHEET_PORT";
const ENV_LOG_FORMAT: &str = "HOTSHEET_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("invalid configuration: {}", format_validation(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load configuration from the process environment and an optional file.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an injectable environment lookup.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let file = path
        .map(Path::to_path_buf)
        .or_else(|| lookup(CONFIG_PATH_ENV).map(PathBuf::from));

    let mut config = match file {
        Some(path) => read_config_file(&path)?,
        None => Config::default(),
    };

    if let Some(key) = lookup(ENV_ANTHROPIC_KEY) {
        config.providers.anthropic_api_key = Some(key);
    }
    if let Some(key) = lookup(ENV_REMOVEBG_KEY) {
        config.providers.removebg_api_key = Some(key);
    }
    if let Some(key) = lookup(ENV_SERPAPI_KEY) {
        config.providers.serpapi_key = Some(key);
    }
    if let Some(bind) = lookup(ENV_BIND) {
        config.server.bind = bind;
    }
    if let Some(port) = lookup(ENV_PORT) {
        config.server.port = port.parse().map_err(|e| ConfigError::Env {
            var: ENV_PORT,
            message: format!("{e}"),
        })?;
    }
    if let Some(format) = lookup(ENV_LOG_FORMAT) {
        config.logging.format = format
            .parse()
            .map_err(|message| ConfigError::Env {
                var: ENV_LOG_FORMAT,
                message,
            })?;
    }

    normalize_keys(&mut config.providers);
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Blank keys from a file count as absent.
fn normalize_keys(providers: &mut ProvidersConfig) {
    for key in [
        &mut providers.anthropic_api_key,
        &mut providers.removebg_api_key,
        &mut providers.serpapi_key,
    ] {
        if key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            *key = None;
        }
    }
}

/// The effective configuration as JSON with secrets redacted.
pub fn redacted_json(config: &Config) -> Value {
    let value = serde_json::to_value(config).unwrap_or(Value::Null);
    crate::security::redact_secrets(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = load_config_with_env(None, env_of(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.providers.anthropic_api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = load_config_with_env(
            None,
            env_of(&[
                ("ANTHROPIC_API_KEY", "sk-ant-test"),
                ("SERPAPI_KEY", "  "),
                ("HOTSHEET_PORT", "8080"),
                ("HOTSHEET_BIND", "0.0.0.0"),
                ("HOTSHEET_LOG_FORMAT", "text"),
            ]),
        )
        .unwrap();
        assert_eq!(config.providers.anthropic_api_key.as_deref(), Some("sk-ant-test"));
        assert!(config.providers.serpapi_key.is_none());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_bad_port_env() {
        let err = load_config_with_env(None, env_of(&[("HOTSHEET_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "HOTSHEET_PORT", .. }));
    }

    #[test]
    fn test_json5_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                // comments are allowed
                server: {{ port: 4000 }},
                rateLimits: {{ removeBg: 2, }},
                providers: {{ removebgApiKey: "from-file", serpapiKey: "" }},
            }}"#
        )
        .unwrap();

        let config = load_config_with_env(
            Some(file.path()),
            env_of(&[("REMOVEBG_API_KEY", "from-env")]),
        )
        .unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.rate_limits.remove_bg, 2);
        assert_eq!(config.rate_limits.proxy_image, 30);
        assert_eq!(config.providers.removebg_api_key.as_deref(), Some("from-env"));
        assert!(config.providers.serpapi_key.is_none());
    }

    #[test]
    fn test_config_path_from_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ server: {{ port: 5050 }} }}").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config =
            load_config_with_env(None, env_of(&[("HOTSHEET_CONFIG", path.as_str())])).unwrap();
        assert_eq!(config.server.port, 5050);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config_with_env(
            Some(Path::new("/nonexistent/hotsheet.json5")),
            env_of(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ timeouts: {{ searchMs: 0 }} }}").unwrap();
        let err = load_config_with_env(Some(file.path()), env_of(&[])).unwrap_err();
        match err {
            ConfigError::Invalid(errors) => assert_eq!(errors[0].path, "timeouts.searchMs"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_redacted_json_hides_keys() {
        let mut config = Config::default();
        config.providers.serpapi_key = Some("serp-secret".to_string());
        let json = redacted_json(&config);
        assert_eq!(json["providers"]["serpapiKey"], crate::security::REDACTED_PLACEHOLDER);
        assert_eq!(json["providers"]["anthropicApiKey"], Value::Null);
        assert_eq!(json["server"]["port"], 3000);
    }
}
