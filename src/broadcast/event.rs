//! Inbound message events and their outbound rendering.

use crate::config::Attribution;
use crate::state::{ConnectionId, Outbound};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One inbound application message.
///
/// Lives only for the duration of a single fan-out. The receive timestamp
/// is for logs; it never appears on the wire.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    origin: ConnectionId,
    payload: String,
    received_at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(origin: ConnectionId, payload: impl Into<String>) -> Self {
        Self {
            origin,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    pub fn origin(&self) -> ConnectionId {
        self.origin
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Format the outbound frame text for this event.
    pub fn render(&self, attribution: Attribution) -> Outbound {
        match attribution {
            Attribution::None => Arc::from(self.payload.as_str()),
            Attribution::Prefixed => Arc::from(format!("{}: {}", self.origin, self.payload)),
        }
    }
}
