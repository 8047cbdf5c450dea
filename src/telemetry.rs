//! Standardized span constructors for connection observability.

pub mod spans {
    use crate::state::ConnectionId;
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Create a span for one client connection.
    ///
    /// Every log event emitted by the connection's task carries `id` and
    /// `addr`.
    pub fn connection(id: ConnectionId, addr: SocketAddr, transport: &'static str) -> Span {
        info_span!("connection", id = %id, addr = %addr, transport)
    }

    /// Create a span for a socket that has not finished its handshake yet.
    pub fn handshake(addr: SocketAddr) -> Span {
        info_span!("handshake", addr = %addr)
    }
}
