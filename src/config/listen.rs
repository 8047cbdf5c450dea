//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

use super::defaults::{
    default_handshake_timeout_ms, default_listen_address, default_max_message_bytes,
    default_path,
};

/// Wire framing spoken on the WebSocket path.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// One text frame per message, no envelope.
    #[default]
    Raw,
    /// JSON envelope tagged with an event name: `{"event":"message","data":"..."}`.
    Tagged,
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000").
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
    /// Request path that upgrades to a WebSocket.
    #[serde(default = "default_path")]
    pub path: String,
    /// Framing used on upgraded connections.
    #[serde(default)]
    pub protocol: Protocol,
    /// Allowed origins for CORS (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// Document server that receives every request for another path.
    /// Without one, such requests are answered with 404.
    pub fallback: Option<SocketAddr>,
    /// Upper bound on the upgrade handshake, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Largest accepted inbound message, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            path: default_path(),
            protocol: Protocol::default(),
            allow_origins: Vec::new(),
            fallback: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl ListenConfig {
    pub fn handshake_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Whether a WebSocket `Origin` header value may connect.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allow_origins.iter().any(|a| a == origin || a == "*"),
            None => false,
        }
    }
}

/// Line-oriented TCP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaintextConfig {
    /// Address to bind to (e.g., "0.0.0.0:3001").
    pub address: SocketAddr,
}
