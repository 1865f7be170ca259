//! Prometheus metrics for the network core.
//!
//! [`NetMetrics`] owns a dedicated [`Registry`]; the hosting process decides
//! whether and how to expose it.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

pub struct NetMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Inbound streams handed out by the listener.
    pub accepted: IntCounter,
    /// Accept calls that failed with a retryable error.
    pub temporary_accept_errors: IntCounter,
    pub handshakes_completed: IntCounter,
    pub handshakes_failed: IntCounter,
    /// Pending slots reclaimed because no handshake arrived in time.
    pub slot_timeouts: IntCounter,
    /// Authenticated messages placed on a shard queue.
    pub messages_enqueued: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Pending slots currently held.
    pub pending_connections: IntGauge,
}

impl NetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let accepted = register_int_counter_with_registry!(
            Opts::new(
                "strata_net_accepted_total",
                "Inbound streams accepted by the listener"
            ),
            registry
        )?;

        let temporary_accept_errors = register_int_counter_with_registry!(
            Opts::new(
                "strata_net_temporary_accept_errors_total",
                "Accept calls that failed with a temporary error"
            ),
            registry
        )?;

        let handshakes_completed = register_int_counter_with_registry!(
            Opts::new(
                "strata_net_handshakes_completed_total",
                "Handshakes that produced a session"
            ),
            registry
        )?;

        let handshakes_failed = register_int_counter_with_registry!(
            Opts::new(
                "strata_net_handshakes_failed_total",
                "Pre-session messages that failed to authenticate"
            ),
            registry
        )?;

        let slot_timeouts = register_int_counter_with_registry!(
            Opts::new(
                "strata_net_slot_timeouts_total",
                "Pending slots reclaimed by the session timeout"
            ),
            registry
        )?;

        let messages_enqueued = register_int_counter_with_registry!(
            Opts::new(
                "strata_net_messages_enqueued_total",
                "Messages routed to an inbound shard queue"
            ),
            registry
        )?;

        let pending_connections = register_int_gauge_with_registry!(
            Opts::new(
                "strata_net_pending_connections",
                "Pending slots currently held"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            accepted,
            temporary_accept_errors,
            handshakes_completed,
            handshakes_failed,
            slot_timeouts,
            messages_enqueued,
            pending_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn metrics_encode() {
        let metrics = NetMetrics::new().unwrap();
        metrics.accepted.inc();
        metrics.pending_connections.set(3);

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buf)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("strata_net_accepted_total 1"));
        assert!(text.contains("strata_net_pending_connections 3"));
    }

    #[test]
    fn instances_are_independent() {
        let a = NetMetrics::new().unwrap();
        let b = NetMetrics::new().unwrap();
        a.slot_timeouts.inc();
        assert_eq!(b.slot_timeouts.get(), 0);
    }
}
