//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- start the gateway server
//! - `config show|get` -- inspect the effective configuration
//! - `status` -- query a running instance's health endpoint
//! - `version` -- print build/version info

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{self, Config};
use crate::logging;
use crate::server::{self, AppState};

/// Hardened gateway between the SKU card / Hot Sheet builder and its
/// third-party APIs.
#[derive(Parser, Debug)]
#[command(
    name = "hotsheet",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hot Sheet gateway: image proxy, background removal, image suggestions, AI brand research"
)]
pub struct Cli {
    /// Path to a JSON5 config file (overrides HOTSHEET_CONFIG).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Start,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Query a running instance's health endpoint.
    Status {
        /// Port of the running instance (default: from config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host of the running instance.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration (secrets redacted) as JSON.
    Show,

    /// Print a specific configuration value by dot-notation path.
    Get {
        /// Dot-notation key (e.g. "server.port", "timeouts.llmMs").
        key: String,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Run the `start` subcommand until Ctrl-C or SIGTERM.
pub async fn handle_start(config_path: Option<&Path>) -> CliResult {
    let cfg = config::load_config(config_path)?;
    logging::init_tracing(&cfg.logging)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_shutdown_signal(shutdown.clone()));

    let state = AppState::from_config(&cfg, shutdown.clone())?;
    server::serve(&cfg, state, shutdown).await?;
    Ok(())
}

async fn forward_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
    token.cancel();
}

/// Run the `config show` subcommand.
pub fn handle_config_show(config_path: Option<&Path>) -> CliResult {
    let cfg = config::load_config(config_path)?;
    let pretty = serde_json::to_string_pretty(&config::redacted_json(&cfg))?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `config get <key>` subcommand.
pub fn handle_config_get(config_path: Option<&Path>, key: &str) -> CliResult {
    let cfg = config::load_config(config_path)?;
    match get_value_at_path(&config::redacted_json(&cfg), key) {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => Err(format!("Key not found: {key}").into()),
    }
}

/// Run the `status` subcommand.
pub async fn handle_status(config_path: Option<&Path>, host: &str, port: Option<u16>) -> CliResult {
    let port = match port {
        Some(port) => port,
        None => resolve_port(config_path),
    };
    let url = format!("http://{host}:{port}/health");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: Value = resp.json().await?;
            println!("hotsheet gateway at {host}:{port}");
            println!("  Status:   {}", body["status"].as_str().unwrap_or("unknown"));
            println!("  Version:  {}", body["version"].as_str().unwrap_or("unknown"));
            Ok(())
        }
        Ok(resp) => Err(format!("health check returned HTTP {}", resp.status()).into()),
        Err(_) => Err(format!(
            "could not connect to {host}:{port}; is the server running? Start it with: hotsheet start"
        )
        .into()),
    }
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("hotsheet {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("HOTSHEET_BUILD_DATE"));
    println!("  Git commit: {}", env!("HOTSHEET_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

/// Navigate a JSON value by dot-notation path and return the leaf value.
fn get_value_at_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current.clone())
}

/// Port from config, falling back to the built-in default when the config
/// cannot be loaded.
fn resolve_port(config_path: Option<&Path>) -> u16 {
    config::load_config(config_path)
        .map(|cfg| cfg.server.port)
        .unwrap_or_else(|_| Config::default().server.port)
}
