//! Gateway - TCP listeners that accept incoming connections.
//!
//! The Gateway binds the WebSocket listener (and optionally a line-based
//! plaintext listener), creates a `Connecting` [`Connection`] for each
//! accepted socket and spawns one tracked task for it. On shutdown it stops
//! accepting, closes every registered connection and waits for all of
//! those tasks to finish.

use super::frontend::{self, Route};
use crate::broadcast::Broadcaster;
use crate::config::{Config, ListenConfig};
use crate::error::HandshakeError;
use crate::network::Dispatcher;
use crate::network::transport::{LineTransport, Transport, WebSocketTransport};
use crate::state::{Connection, IdGenerator, Outbound};
use crate::telemetry::spans;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, instrument, warn};

/// Pause after a failed `accept` so a persistent error (e.g. out of file
/// descriptors) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by every connection task.
struct Shared {
    listen: ListenConfig,
    send_queue: usize,
    broadcaster: Arc<Broadcaster>,
    ids: IdGenerator,
    shutdown: CancellationToken,
}

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct Gateway {
    websocket_listener: TcpListener,
    plaintext_listener: Option<TcpListener>,
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl Gateway {
    /// Bind the listeners named in `config`.
    pub async fn bind(
        config: &Config,
        broadcaster: Arc<Broadcaster>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let websocket_listener = TcpListener::bind(config.listen.address).await?;
        info!(
            address = %websocket_listener.local_addr()?,
            path = %config.listen.path,
            "WebSocket listener bound"
        );

        let plaintext_listener = if let Some(plaintext) = &config.plaintext {
            let listener = TcpListener::bind(plaintext.address).await?;
            info!(address = %listener.local_addr()?, "Plaintext listener bound");
            Some(listener)
        } else {
            None
        };

        Ok(Self {
            websocket_listener,
            plaintext_listener,
            shared: Arc::new(Shared {
                listen: config.listen.clone(),
                send_queue: config.broadcast.send_queue,
                broadcaster,
                ids: IdGenerator::new(),
                shutdown,
            }),
            tracker: TaskTracker::new(),
        })
    }

    /// Run the gateway until the shutdown token fires, then close every
    /// connection and wait for their tasks.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        let websocket = self.accept_websocket();
        let plaintext = async {
            if let Some(listener) = &self.plaintext_listener {
                self.accept_plaintext(listener).await;
            }
        };
        tokio::join!(websocket, plaintext);

        let closed = self.shared.broadcaster.registry().close_all();
        info!(connections = closed, "Shutting down, closing connections");

        self.tracker.close();
        self.tracker.wait().await;
        let registry = self.shared.broadcaster.registry();
        if !registry.is_empty() {
            warn!(remaining = registry.len(), "Connections still registered after shutdown");
        }
        info!("All connections closed");
        Ok(())
    }

    async fn accept_websocket(&self) {
        loop {
            let accepted = tokio::select! {
                _ = self.shared.shutdown.cancelled() => return,
                accepted = self.websocket_listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let (conn, outbound) = self.shared.connect(addr);
                    debug!(%addr, id = %conn.id(), "WebSocket listener accepted");
                    let shared = Arc::clone(&self.shared);
                    self.tracker.spawn(
                        serve_websocket(shared, conn, outbound, stream)
                            .instrument(spans::handshake(addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    async fn accept_plaintext(&self, listener: &TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shared.shutdown.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let (conn, outbound) = self.shared.connect(addr);
                    let transport = LineTransport::new(stream, self.shared.listen.max_message_bytes);
                    let shared = Arc::clone(&self.shared);
                    self.tracker
                        .spawn(async move { shared.dispatch(conn, outbound, transport).await });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept plaintext connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

impl Shared {
    /// Assign an id to a freshly accepted socket.
    ///
    /// The connection stays `Connecting` until its Dispatcher opens it, and
    /// closes with the server.
    fn connect(&self, addr: SocketAddr) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        Connection::new(
            self.ids.next(),
            addr,
            self.send_queue,
            self.shutdown.child_token(),
        )
    }

    /// Run the Dispatcher for a connection whose transport is ready.
    async fn dispatch<T: Transport>(
        &self,
        conn: Arc<Connection>,
        outbound: mpsc::Receiver<Outbound>,
        transport: T,
    ) {
        let span = spans::connection(conn.id(), conn.addr(), transport.kind());
        Dispatcher::new(conn, outbound, transport, Arc::clone(&self.broadcaster))
            .run()
            .instrument(span)
            .await;
    }
}

/// Route one socket from the WebSocket listener and, once upgraded, hand
/// it to a Dispatcher.
///
/// A connection that never completes the handshake is closed without
/// entering the Registry.
async fn serve_websocket(
    shared: Arc<Shared>,
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<Outbound>,
    stream: TcpStream,
) {
    let addr = conn.addr();
    let deadline = Instant::now() + shared.listen.handshake_timeout();
    let cancel = conn.cancelled().clone();

    let route = tokio::select! {
        _ = cancel.cancelled() => return abandon(&conn, "server shutdown"),
        route = tokio::time::timeout_at(deadline, frontend::route(&stream, &shared.listen.path)) => route,
    };
    match route {
        Ok(Ok(Route::Upgrade)) => {}
        Ok(Ok(Route::Delegate)) => {
            abandon(&conn, "delegated");
            tokio::select! {
                _ = shared.shutdown.cancelled() => {}
                res = frontend::delegate(stream, addr, shared.listen.fallback) => {
                    if let Err(e) = res {
                        debug!(error = %e, "delegated request failed");
                    }
                }
            }
            return;
        }
        Ok(Err(e)) => return handshake_failed(&conn, &e),
        Err(_) => return handshake_failed(&conn, &HandshakeError::Timeout),
    }

    let upgraded = tokio::select! {
        _ = cancel.cancelled() => return abandon(&conn, "server shutdown"),
        ws = tokio::time::timeout_at(deadline, frontend::upgrade(stream, addr, &shared.listen)) => ws,
    };
    let ws = match upgraded {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return handshake_failed(&conn, &e),
        Err(_) => return handshake_failed(&conn, &HandshakeError::Timeout),
    };

    let transport = WebSocketTransport::new(
        ws,
        shared.listen.protocol,
        shared.listen.max_message_bytes,
    );
    shared.dispatch(conn, outbound, transport).await;
}

fn handshake_failed(conn: &Connection, e: &HandshakeError) {
    warn!(error = %e, "WebSocket handshake failed");
    crate::metrics::record_handshake_failure(e.error_code());
    abandon(conn, "handshake failed");
}

/// Close a connection that never reached its Dispatcher.
fn abandon(conn: &Connection, reason: &'static str) {
    conn.close_with(reason);
    conn.finish();
}
