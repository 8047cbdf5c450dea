//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::broadcast::BroadcastConfig;
use super::defaults::{DEFAULT_METRICS_PORT, default_server_name};
use super::listen::{ListenConfig, PlaintextConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
///
/// Every section is optional; an empty file yields a server on
/// `127.0.0.1:3000` accepting raw WebSocket frames on `/message`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server identity and process-level settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listener configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Optional line-oriented TCP listener.
    pub plaintext: Option<PlaintextConfig>,
    /// Fan-out policy.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, used in logs.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: None,
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Effective metrics port, or `None` when metrics are disabled.
    pub fn metrics_port(&self) -> Option<u16> {
        match self.metrics_port.unwrap_or(DEFAULT_METRICS_PORT) {
            0 => None,
            port => Some(port),
        }
    }
}
