//! Per-connection Dispatcher.
//!
//! One Dispatcher runs per accepted client, in its own task. It owns the
//! client's [`Transport`] and is its only writer: frames queued by the
//! [`Broadcaster`] are drained from the connection's outbound queue and
//! written in order, while inbound frames are decoded and published.
//!
//! ```text
//! Connecting -> Open -> Closing -> Closed
//!                ^         ^
//!   admit + welcome    remote close, read error, eviction, shutdown
//! ```
//!
//! Teardown runs exactly once no matter how many of those signals race.

mod error_handling;

use crate::broadcast::{Broadcaster, MessageEvent};
use crate::network::transport::{Inbound, Transport};
use crate::state::{Connection, Outbound};
use error_handling::{ReadErrorAction, classify_read_error};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Upper bound on the closing handshake once a connection is done.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Drives one connection from handshake completion to teardown.
pub struct Dispatcher<T> {
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<Outbound>,
    transport: T,
    broadcaster: Arc<Broadcaster>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        conn: Arc<Connection>,
        outbound: mpsc::Receiver<Outbound>,
        transport: T,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            conn,
            outbound,
            transport,
            broadcaster,
        }
    }

    /// Run the connection until it closes. Never returns an error: every
    /// failure here is contained to this one connection.
    pub async fn run(mut self) {
        let id = self.conn.id();

        if !self.conn.open() {
            debug!("connection closed before it opened");
            self.release().await;
            self.conn.finish();
            return;
        }

        if let Err(e) = self.broadcaster.admit(&self.conn) {
            warn!(error = %e, code = e.error_code(), "registry admission failed");
            self.conn.close_with("admission failed");
            self.release().await;
            self.conn.finish();
            return;
        }

        info!(
            %id,
            addr = %self.conn.addr(),
            connected = self.broadcaster.registry().len(),
            "connection opened"
        );
        crate::metrics::record_opened(self.transport.kind());
        self.broadcaster.announce_joined(id);

        self.event_loop().await;

        self.conn.close();
        self.broadcaster.registry().remove(id);
        self.release().await;

        if self.conn.finish() {
            let reason = self.conn.close_reason().unwrap_or("closed");
            info!(%id, reason, "connection closed");
            crate::metrics::record_closed(reason);
        }
        self.broadcaster.announce_left(id);
    }

    async fn event_loop(&mut self) {
        let cancel = self.conn.cancelled().clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        self.conn.close_with("outbound queue closed");
                        break;
                    };
                    let written = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        written = self.transport.send(&frame) => written,
                    };
                    if let Err(e) = written {
                        debug!(error = %e, "write failed");
                        self.conn.close_with("write error");
                        break;
                    }
                }

                inbound = self.transport.recv() => match inbound {
                    None | Some(Ok(Inbound::Disconnect)) => {
                        self.conn.close_with("client disconnected");
                        break;
                    }
                    Some(Ok(Inbound::Message(text))) => self.on_message(text),
                    Some(Err(e)) => match classify_read_error(&e) {
                        ReadErrorAction::Skip => {
                            warn!(error = %e, "dropping malformed frame");
                            crate::metrics::record_decode_error(self.transport.kind());
                        }
                        ReadErrorAction::Disconnect { reason } => {
                            debug!(error = %e, code = e.error_code(), "read failed");
                            self.conn.close_with(reason);
                            break;
                        }
                    },
                },
            }
        }
    }

    fn on_message(&self, text: String) {
        let bytes = text.len();
        debug!(id = %self.conn.id(), bytes, "message received");
        crate::metrics::record_received(bytes);

        let event = MessageEvent::new(self.conn.id(), text);
        self.broadcaster.publish(&event);
    }

    /// Close the transport, bounded by [`CLOSE_TIMEOUT`].
    async fn release(&mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "transport close failed"),
            Err(_) => debug!("transport close timed out"),
        }
    }
}
