//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "broadcastd".to_string()
}

/// Port for the Prometheus endpoint when `metrics_port` is not set.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

// =============================================================================
// Listener Defaults
// =============================================================================

pub fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

pub fn default_path() -> String {
    "/message".to_string()
}

pub fn default_handshake_timeout_ms() -> u64 {
    5000
}

pub fn default_max_message_bytes() -> usize {
    64 * 1024
}

// =============================================================================
// Broadcast Defaults
// =============================================================================

pub fn default_welcome() -> String {
    "Welcome to the broadcast server!".to_string()
}

pub fn default_send_queue() -> usize {
    256
}
