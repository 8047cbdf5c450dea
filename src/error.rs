//! Unified error handling for broadcastd.
//!
//! Every error here is scoped to a single connection. None of them is
//! allowed to escape a Dispatcher and affect another connection, the
//! Registry or the Broadcaster. Each variant carries a static code used
//! as a metrics label.

use crate::state::ConnectionId;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

// ============================================================================
// Handshake Errors (accept/upgrade, before a connection is Open)
// ============================================================================

/// Failure to bring an accepted socket to the Open state.
///
/// A connection that fails its handshake never enters the Registry.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,

    #[error("handshake rejected: {0}")]
    Rejected(&'static str),

    #[error("websocket handshake failed: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("i/o error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Rejected(_) => "rejected",
            Self::WebSocket(_) => "websocket",
            Self::Io(_) => "io",
        }
    }
}

// ============================================================================
// Transport Errors (reading and writing frames on an Open connection)
// ============================================================================

/// Errors raised by a [`Transport`](crate::network::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// A frame arrived that could not be turned into a message.
    /// Recoverable: the connection stays open.
    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("transport closed")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl TransportError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Closed => "closed",
            Self::Io(_) => "io",
            Self::WebSocket(_) => "websocket",
        }
    }

    /// Whether the connection can keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

// ============================================================================
// Delivery Errors (enqueueing a frame for one recipient)
// ============================================================================

/// A frame could not be handed to a recipient's outbound queue.
///
/// Never reported back to the publisher; the recipient is removed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection {0} is not open")]
    Closed(ConnectionId),

    #[error("send queue exceeded for connection {0}")]
    QueueFull(ConnectionId),
}

impl DeliveryError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Closed(_) => "closed",
            Self::QueueFull(_) => "queue_full",
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Closed(id) | Self::QueueFull(id) => *id,
        }
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Registry admission failures. Fatal to the single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Indicates an id-assignment bug; ids are never reused.
    #[error("connection id {0} is already registered")]
    DuplicateId(ConnectionId),

    #[error("connection {0} is not open")]
    NotOpen(ConnectionId),
}

impl RegistryError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "duplicate_id",
            Self::NotOpen(_) => "not_open",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(HandshakeError::Timeout.error_code(), "timeout");
        assert_eq!(TransportError::Decode("x".into()).error_code(), "decode");
        assert_eq!(
            DeliveryError::QueueFull(ConnectionId::new(3)).error_code(),
            "queue_full"
        );
        assert_eq!(
            RegistryError::DuplicateId(ConnectionId::new(3)).error_code(),
            "duplicate_id"
        );
    }

    #[test]
    fn test_only_decode_errors_are_recoverable() {
        assert!(TransportError::Decode("bad".into()).is_recoverable());
        assert!(!TransportError::Closed.is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!TransportError::Io(io).is_recoverable());
    }

    #[test]
    fn test_delivery_error_reports_recipient() {
        let id = ConnectionId::new(42);
        assert_eq!(DeliveryError::Closed(id).connection_id(), id);
        assert_eq!(DeliveryError::QueueFull(id).connection_id(), id);
    }
}
