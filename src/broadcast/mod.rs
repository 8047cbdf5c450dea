//! Fan-out of messages to every open connection.
//!
//! The Broadcaster never touches a transport. It resolves recipients from
//! a [`Registry`] snapshot and enqueues one shared frame per recipient
//! with a non-blocking `try_send`. Each connection's Dispatcher is the
//! only writer of its transport, so frames reach a recipient in the order
//! they were enqueued.
//!
//! A recipient whose queue is full or already closed is evicted: removed
//! from the Registry and closed. The publisher never sees the failure.

mod event;

pub use event::MessageEvent;

use crate::config::{Attribution, BroadcastConfig};
use crate::error::{DeliveryError, RegistryError};
use crate::state::{Connection, ConnectionId, Outbound, Registry};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one fan-out, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients the frame was enqueued for.
    pub delivered: usize,
    /// Recipients that were evicted instead.
    pub failed: usize,
}

/// Fans messages out to the members of a [`Registry`].
pub struct Broadcaster {
    registry: Arc<Registry>,
    attribution: Attribution,
    exclude_self: bool,
    welcome: Option<Outbound>,
    announce_presence: bool,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, config: &BroadcastConfig) -> Self {
        let welcome = (!config.welcome.is_empty()).then(|| Arc::from(config.welcome.as_str()));
        Self {
            registry,
            attribution: config.attribution,
            exclude_self: config.exclude_self,
            welcome,
            announce_presence: config.announce_presence,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a newly opened connection and greet it.
    ///
    /// The welcome is enqueued before the connection becomes visible to
    /// `snapshot`, so it always precedes the first broadcast it receives.
    pub fn admit(&self, conn: &Arc<Connection>) -> Result<(), RegistryError> {
        self.registry
            .add_with(Arc::clone(conn), |conn| self.welcome(conn))
    }

    /// Send the greeting to exactly one connection.
    pub fn welcome(&self, conn: &Connection) {
        let Some(frame) = &self.welcome else {
            return;
        };
        if let Err(e) = conn.send(Arc::clone(frame)) {
            debug!(id = %conn.id(), error = %e, "welcome not delivered");
        }
    }

    /// Publish a client message using the configured `exclude_self` policy.
    pub fn publish(&self, event: &MessageEvent) -> Delivery {
        self.publish_with(event, self.exclude_self)
    }

    /// Publish a client message to every open connection, skipping the
    /// sender when `exclude_self` is set.
    pub fn publish_with(&self, event: &MessageEvent, exclude_self: bool) -> Delivery {
        let frame = event.render(self.attribution);
        let exclude = exclude_self.then(|| event.origin());
        let delivery = self.fan_out(frame, exclude);
        debug!(
            origin = %event.origin(),
            bytes = event.payload().len(),
            received_at = %event.received_at(),
            recipients = delivery.delivered,
            "broadcast delivered"
        );
        delivery
    }

    /// Publish a server-originated line. Never attributed.
    pub fn notice(&self, text: &str, exclude: Option<ConnectionId>) -> Delivery {
        self.fan_out(Arc::from(text), exclude)
    }

    /// Tell everyone else that `id` joined. No-op unless presence is on.
    pub fn announce_joined(&self, id: ConnectionId) {
        if self.announce_presence {
            self.notice(&format!("{id} connected"), Some(id));
        }
    }

    /// Tell the remaining connections that `id` left. No-op unless
    /// presence is on.
    pub fn announce_left(&self, id: ConnectionId) {
        if self.announce_presence {
            self.notice(&format!("{id} disconnected"), Some(id));
        }
    }

    fn fan_out(&self, frame: Outbound, exclude: Option<ConnectionId>) -> Delivery {
        let mut delivery = Delivery::default();

        for conn in self.registry.snapshot() {
            if exclude == Some(conn.id()) {
                continue;
            }
            match conn.send(Arc::clone(&frame)) {
                Ok(()) => delivery.delivered += 1,
                Err(err) => {
                    delivery.failed += 1;
                    self.evict(&conn, err);
                }
            }
        }

        crate::metrics::record_fanout(delivery.delivered);
        delivery
    }

    fn evict(&self, conn: &Connection, err: DeliveryError) {
        warn!(id = %err.connection_id(), error = %err, "delivery error");
        crate::metrics::record_delivery_error(err.error_code());

        self.registry.remove(conn.id());
        if let DeliveryError::QueueFull(_) = err {
            conn.close_with("send queue exceeded");
        } else {
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::open_connection;
    use tokio::sync::mpsc;

    fn config(attribution: Attribution, exclude_self: bool) -> BroadcastConfig {
        BroadcastConfig {
            attribution,
            exclude_self,
            welcome: "welcome".to_string(),
            ..BroadcastConfig::default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame.to_string());
        }
        out
    }

    fn admit(
        broadcaster: &Broadcaster,
        raw_id: u64,
        send_queue: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (conn, mut rx) = open_connection(raw_id, send_queue);
        broadcaster.admit(&conn).unwrap();
        assert_eq!(drain(&mut rx), vec!["welcome"]);
        (conn, rx)
    }

    #[test]
    fn test_exclude_self_prefixed() {
        let broadcaster = Broadcaster::new(
            Arc::new(Registry::new()),
            &config(Attribution::Prefixed, true),
        );
        let (c1, mut r1) = admit(&broadcaster, 1, 8);
        let (_c2, mut r2) = admit(&broadcaster, 2, 8);

        let delivery = broadcaster.publish(&MessageEvent::new(c1.id(), "hi"));

        assert_eq!(delivery, Delivery { delivered: 1, failed: 0 });
        assert_eq!(drain(&mut r2), vec![format!("{}: hi", c1.id())]);
        assert!(drain(&mut r1).is_empty());
    }

    #[test]
    fn test_self_echo_when_not_excluded() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (c1, mut r1) = admit(&broadcaster, 1, 8);

        broadcaster.publish(&MessageEvent::new(c1.id(), "solo"));
        assert_eq!(drain(&mut r1), vec!["solo"]);
    }

    #[test]
    fn test_publish_with_overrides_policy() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (c1, mut r1) = admit(&broadcaster, 1, 8);
        let (_c2, mut r2) = admit(&broadcaster, 2, 8);

        broadcaster.publish_with(&MessageEvent::new(c1.id(), "quiet"), true);
        assert!(drain(&mut r1).is_empty());
        assert_eq!(drain(&mut r2), vec!["quiet"]);
    }

    #[test]
    fn test_removed_connection_not_delivered() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (c1, mut r1) = admit(&broadcaster, 1, 8);
        let (c2, mut r2) = admit(&broadcaster, 2, 8);
        let (_c3, mut r3) = admit(&broadcaster, 3, 8);

        c2.close();
        broadcaster.registry().remove(c2.id());

        let delivery = broadcaster.publish(&MessageEvent::new(c1.id(), "x"));
        assert_eq!(delivery, Delivery { delivered: 2, failed: 0 });
        assert_eq!(drain(&mut r1), vec!["x"]);
        assert!(drain(&mut r2).is_empty());
        assert_eq!(drain(&mut r3), vec!["x"]);
    }

    #[test]
    fn test_slow_consumer_is_evicted() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (c1, mut r1) = admit(&broadcaster, 1, 8);
        let (slow, _r2) = admit(&broadcaster, 2, 1);

        let first = broadcaster.publish(&MessageEvent::new(c1.id(), "one"));
        assert_eq!(first, Delivery { delivered: 2, failed: 0 });

        let second = broadcaster.publish(&MessageEvent::new(c1.id(), "two"));
        assert_eq!(second, Delivery { delivered: 1, failed: 1 });
        assert!(!broadcaster.registry().contains(slow.id()));
        assert_eq!(slow.close_reason(), Some("send queue exceeded"));
        assert!(slow.cancelled().is_cancelled());

        let third = broadcaster.publish(&MessageEvent::new(c1.id(), "three"));
        assert_eq!(third, Delivery { delivered: 1, failed: 0 });
        assert_eq!(drain(&mut r1), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_dropped_receiver_is_evicted() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (c1, _r1) = admit(&broadcaster, 1, 8);
        let (gone, r2) = admit(&broadcaster, 2, 8);
        drop(r2);

        let delivery = broadcaster.publish(&MessageEvent::new(c1.id(), "x"));
        assert_eq!(delivery.failed, 1);
        assert!(!broadcaster.registry().contains(gone.id()));
    }

    #[test]
    fn test_welcome_precedes_broadcasts() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (c1, _r1) = admit(&broadcaster, 1, 8);
        let (late, mut rx) = open_connection(2, 8);
        broadcaster.admit(&late).unwrap();
        broadcaster.publish(&MessageEvent::new(c1.id(), "after"));

        assert_eq!(drain(&mut rx), vec!["welcome", "after"]);
    }

    #[test]
    fn test_empty_welcome_is_skipped() {
        let cfg = BroadcastConfig {
            welcome: String::new(),
            ..BroadcastConfig::default()
        };
        let broadcaster = Broadcaster::new(Arc::new(Registry::new()), &cfg);
        let (conn, mut rx) = open_connection(1, 8);
        broadcaster.admit(&conn).unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_admit_duplicate_fails() {
        let broadcaster =
            Broadcaster::new(Arc::new(Registry::new()), &config(Attribution::None, false));
        let (_c1, _r1) = admit(&broadcaster, 1, 8);
        let (dup, mut rx) = open_connection(1, 8);

        let err = broadcaster.admit(&dup).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId(ConnectionId::new(1)));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_presence_notices_are_unattributed() {
        let cfg = BroadcastConfig {
            announce_presence: true,
            ..config(Attribution::Prefixed, false)
        };
        let broadcaster = Broadcaster::new(Arc::new(Registry::new()), &cfg);
        let (_c1, mut r1) = admit(&broadcaster, 1, 8);
        let (c2, mut r2) = admit(&broadcaster, 2, 8);

        broadcaster.announce_joined(c2.id());
        assert_eq!(drain(&mut r1), vec!["AAAAAC connected"]);
        assert!(drain(&mut r2).is_empty());

        broadcaster.registry().remove(c2.id());
        broadcaster.announce_left(c2.id());
        assert_eq!(drain(&mut r1), vec!["AAAAAC disconnected"]);
    }

    #[test]
    fn test_presence_disabled_by_default() {
        let broadcaster = Broadcaster::new(
            Arc::new(Registry::new()),
            &config(Attribution::Prefixed, false),
        );
        let (c1, mut r1) = admit(&broadcaster, 1, 8);
        let (_c2, _r2) = admit(&broadcaster, 2, 8);
        broadcaster.announce_joined(ConnectionId::new(2));
        broadcaster.announce_left(c1.id());
        assert!(drain(&mut r1).is_empty());
    }
}
