//! Fan-out policy configuration.

use serde::Deserialize;

use super::defaults::{default_send_queue, default_welcome};

/// Whether client messages are prefixed with the sender's id.
///
/// Fixed for the lifetime of a server; the two formats are never mixed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Attribution {
    /// Frame payload is the original text.
    None,
    /// Frame payload is `"<connection-id>: <text>"`.
    #[default]
    Prefixed,
}

/// Fan-out policy.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Outbound frame format for client messages.
    #[serde(default)]
    pub attribution: Attribution,
    /// Skip the sender when fanning out its own message.
    #[serde(default)]
    pub exclude_self: bool,
    /// Greeting sent to each connection as it opens.
    #[serde(default = "default_welcome")]
    pub welcome: String,
    /// Tell everyone else when a connection opens or closes.
    #[serde(default)]
    pub announce_presence: bool,
    /// Outbound queue capacity per connection. A recipient whose queue is
    /// full is disconnected.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            attribution: Attribution::default(),
            exclude_self: false,
            welcome: default_welcome(),
            announce_presence: false,
            send_queue: default_send_queue(),
        }
    }
}
