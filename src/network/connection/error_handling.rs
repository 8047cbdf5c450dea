//! Classification of transport read errors for the Dispatcher.

use crate::error::TransportError;
use std::io::ErrorKind;
use tokio_tungstenite::tungstenite;

/// What the Dispatcher does after a failed read.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ReadErrorAction {
    /// Malformed frame: log it and keep reading.
    Skip,
    /// The transport is unusable: close with the given reason.
    Disconnect { reason: &'static str },
}

/// Classify a transport read error into an actionable category.
pub(super) fn classify_read_error(e: &TransportError) -> ReadErrorAction {
    if e.is_recoverable() {
        return ReadErrorAction::Skip;
    }
    match e {
        TransportError::Decode(_) => ReadErrorAction::Skip,
        TransportError::Closed => ReadErrorAction::Disconnect {
            reason: "client disconnected",
        },
        TransportError::Io(io) => ReadErrorAction::Disconnect {
            reason: io_reason(io.kind()),
        },
        TransportError::WebSocket(tungstenite::Error::Io(io)) => ReadErrorAction::Disconnect {
            reason: io_reason(io.kind()),
        },
        TransportError::WebSocket(
            tungstenite::Error::Protocol(_) | tungstenite::Error::Utf8 | tungstenite::Error::Capacity(_),
        ) => ReadErrorAction::Disconnect {
            reason: "protocol error",
        },
        TransportError::WebSocket(_) => ReadErrorAction::Disconnect {
            reason: "read error",
        },
    }
}

fn io_reason(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            "connection reset"
        }
        ErrorKind::UnexpectedEof => "client disconnected",
        _ => "read error",
    }
}
