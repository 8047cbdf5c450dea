//! Per-connection state shared between a Dispatcher and the Broadcaster.
//!
//! A [`Connection`] does not own the socket itself. The Dispatcher task is
//! the single writer of the transport; everyone else reaches the client
//! through the bounded outbound queue held here. This keeps per-recipient
//! ordering intact (one FIFO, one writer) and lets the Broadcaster enqueue
//! without ever blocking on a slow client.

use crate::error::DeliveryError;
use crate::state::ConnectionId;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// A formatted outbound frame, shared by every recipient of one publish.
pub type Outbound = Arc<str>;

/// Lifecycle state of a connection.
///
/// Transitions only move forward:
/// `Connecting -> Open -> Closing -> Closed`, with `Connecting -> Closing`
/// for connections that fail before opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl Lifecycle {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One live client channel tracked by the server.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    state: AtomicU8,
    reason: OnceLock<&'static str>,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

impl Connection {
    /// Create a connection in the `Connecting` state.
    ///
    /// Returns the receiving half of the outbound queue, which belongs to
    /// the Dispatcher. `cancel` is normally a child of the server-wide
    /// shutdown token so that stopping the server closes every connection.
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        send_queue: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(send_queue.max(1));
        let conn = Self {
            id,
            addr,
            state: AtomicU8::new(Lifecycle::Connecting as u8),
            reason: OnceLock::new(),
            outbound,
            cancel,
        };
        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == Lifecycle::Open
    }

    /// Token that fires once the connection starts closing.
    pub fn cancelled(&self) -> &CancellationToken {
        &self.cancel
    }

    /// `Connecting -> Open`. Returns false if the connection already moved on.
    pub fn open(&self) -> bool {
        self.transition(Lifecycle::Connecting, Lifecycle::Open)
    }

    /// Why the connection closed, as given by whoever initiated it.
    pub fn close_reason(&self) -> Option<&'static str> {
        self.reason.get().copied()
    }

    /// Request the connection to close.
    ///
    /// Moves `Connecting`/`Open` to `Closing` and wakes the Dispatcher so a
    /// pending read or write is abandoned without waiting for a timeout.
    /// Returns true only for the call that initiated the close; later
    /// calls (concurrent read error, broadcaster eviction, shutdown) are
    /// no-ops.
    pub fn close(&self) -> bool {
        self.close_with("closed")
    }

    /// Like [`close`](Self::close), recording `reason` if this call
    /// initiated the close.
    pub fn close_with(&self, reason: &'static str) -> bool {
        let initiated = self.transition(Lifecycle::Open, Lifecycle::Closing)
            || self.transition(Lifecycle::Connecting, Lifecycle::Closing);
        if initiated {
            let _ = self.reason.set(reason);
        }
        self.cancel.cancel();
        initiated
    }

    /// `Closing -> Closed`, called once the transport is released.
    ///
    /// Returns true exactly once per connection.
    pub fn finish(&self) -> bool {
        self.close();
        self.transition(Lifecycle::Closing, Lifecycle::Closed)
    }

    /// Enqueue a frame without blocking.
    ///
    /// Writes after close are detected and refused instead of touching the
    /// transport. A full queue means the client is not keeping up.
    pub fn send(&self, frame: Outbound) -> Result<(), DeliveryError> {
        if !self.is_open() {
            return Err(DeliveryError::Closed(self.id));
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::QueueFull(self.id),
            TrySendError::Closed(_) => DeliveryError::Closed(self.id),
        })
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
