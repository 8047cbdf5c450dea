//! Prometheus metrics collection for broadcastd.
//!
//! Tracks connection churn, inbound message throughput, fan-out width and
//! per-recipient delivery failures. Exposed over HTTP by [`crate::http`].
//!
//! ## Metrics
//!
//! - `broadcast_connections_opened_total{transport}` - Connections admitted
//! - `broadcast_connections_closed_total{reason}` - Connections torn down
//! - `broadcast_connected` - Currently open connections (gauge)
//! - `broadcast_message_fanout` - Recipients per publish (histogram)
//! - `broadcast_delivery_errors_total{reason}` - Recipients dropped mid-fanout

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Connections that reached the Open state, by transport.
pub static CONNECTIONS_OPENED: OnceLock<IntCounterVec> = OnceLock::new();

/// Connections torn down, by close reason.
pub static CONNECTIONS_CLOSED: OnceLock<IntCounterVec> = OnceLock::new();

/// Inbound client messages accepted for broadcast.
pub static MESSAGES_RECEIVED: OnceLock<IntCounter> = OnceLock::new();

/// Payload bytes of accepted inbound messages.
pub static MESSAGE_BYTES_RECEIVED: OnceLock<IntCounter> = OnceLock::new();

/// Frames rejected as malformed or oversized.
pub static DECODE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Recipients that could not be enqueued during a fan-out.
pub static DELIVERY_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Accepted sockets that never reached the Open state.
pub static HANDSHAKE_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently open connections.
pub static CONNECTED: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Message fan-out histogram: how many recipients per publish.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
/// Until then every `record_*` helper is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(CONNECTIONS_OPENED, IntCounterVec::new(Opts::new("broadcast_connections_opened_total", "Connections admitted by transport"), &["transport"]));
    register!(CONNECTIONS_CLOSED, IntCounterVec::new(Opts::new("broadcast_connections_closed_total", "Connections closed by reason"), &["reason"]));
    register!(MESSAGES_RECEIVED, IntCounter::new("broadcast_messages_received_total", "Inbound messages accepted for broadcast"));
    register!(MESSAGE_BYTES_RECEIVED, IntCounter::new("broadcast_message_bytes_received_total", "Payload bytes of inbound messages"));
    register!(DECODE_ERRORS, IntCounterVec::new(Opts::new("broadcast_decode_errors_total", "Malformed or oversized inbound frames by transport"), &["transport"]));
    register!(DELIVERY_ERRORS, IntCounterVec::new(Opts::new("broadcast_delivery_errors_total", "Recipients dropped during fan-out by reason"), &["reason"]));
    register!(HANDSHAKE_FAILURES, IntCounterVec::new(Opts::new("broadcast_handshake_failures_total", "Failed handshakes by reason"), &["reason"]));
    register!(CONNECTED, IntGauge::new("broadcast_connected", "Currently open connections"));
    register!(MESSAGE_FANOUT, Histogram::with_opts(
        HistogramOpts::new("broadcast_message_fanout", "Recipients per published message")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

fn inc_label(metric: &OnceLock<IntCounterVec>, label: &str) {
    if let Some(c) = metric.get() {
        c.with_label_values(&[label]).inc();
    }
}

/// Record a connection entering the Registry.
#[inline]
pub fn record_opened(transport: &str) {
    inc_label(&CONNECTIONS_OPENED, transport);
    if let Some(g) = CONNECTED.get() {
        g.inc();
    }
}

/// Record a connection leaving the Registry for good.
#[inline]
pub fn record_closed(reason: &str) {
    inc_label(&CONNECTIONS_CLOSED, reason);
    if let Some(g) = CONNECTED.get() {
        g.dec();
    }
}

/// Record an inbound message accepted for broadcast.
#[inline]
pub fn record_received(bytes: usize) {
    if let Some(c) = MESSAGES_RECEIVED.get() {
        c.inc();
    }
    if let Some(c) = MESSAGE_BYTES_RECEIVED.get() {
        c.inc_by(bytes as u64);
    }
}

#[inline]
pub fn record_decode_error(transport: &str) {
    inc_label(&DECODE_ERRORS, transport);
}

#[inline]
pub fn record_delivery_error(reason: &str) {
    inc_label(&DELIVERY_ERRORS, reason);
}

#[inline]
pub fn record_handshake_failure(reason: &str) {
    inc_label(&HANDSHAKE_FAILURES, reason);
}

/// Record message fan-out (how many recipients received a publish).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
}
