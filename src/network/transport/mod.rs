//! Transport abstraction.
//!
//! The Dispatcher and Broadcaster are written against [`Transport`] only,
//! so the framing spoken on the wire can change without touching either.
//!
//! - [`WebSocketTransport`]: one WebSocket text frame per message, raw or
//!   wrapped in an event-tagged JSON envelope
//! - [`LineTransport`]: one `\n`-terminated line per message on plain TCP

mod lines;
mod websocket;

pub use lines::LineTransport;
pub use websocket::WebSocketTransport;

use crate::error::TransportError;
use async_trait::async_trait;

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// An application message to broadcast.
    Message(String),
    /// The client asked to leave.
    Disconnect,
}

/// A bidirectional text channel to one client.
///
/// A transport has exactly one owner, the connection's Dispatcher, which
/// is the only caller of any of these methods.
#[async_trait]
pub trait Transport: Send {
    /// Short label for logs and metrics (e.g. "raw", "lines").
    fn kind(&self) -> &'static str;

    /// Wait for the next inbound event.
    ///
    /// `None` means the peer closed the stream. A `Decode` error leaves the
    /// transport usable; any other error is terminal.
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>>;

    /// Write one outbound frame.
    async fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the stream and release the socket.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reject payloads larger than `max_bytes`.
pub(crate) fn check_size(text: String, max_bytes: usize) -> Result<String, TransportError> {
    if text.len() > max_bytes {
        return Err(TransportError::Decode(format!(
            "message of {} bytes exceeds limit of {max_bytes}",
            text.len()
        )));
    }
    Ok(text)
}
