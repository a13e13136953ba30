//! Prometheus metrics for the validator node.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

/// Central collection of node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Blocks this validator produced and published.
    pub blocks_produced: IntCounter,
    /// Transactions accepted into a pending block.
    pub transactions_accepted: IntCounter,
    /// Transaction submissions rejected (validation, token, capacity).
    pub transactions_rejected: IntCounter,
    /// Block cycles aborted by an attestation failure.
    pub attestation_failures: IntCounter,
    /// Confirmed blocks broadcast to downstream subscribers.
    pub blocks_broadcast: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Healthy archival nodes in the discovery pool.
    pub healthy_archive_nodes: IntGauge,
    /// Currently connected downstream subscribers.
    pub connected_subscribers: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics registered under a new [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let blocks_produced = register_int_counter_with_registry!(
            Opts::new("push_blocks_produced_total", "Blocks produced and published"),
            registry
        )
        .expect("failed to register blocks_produced counter");

        let transactions_accepted = register_int_counter_with_registry!(
            Opts::new(
                "push_transactions_accepted_total",
                "Transactions accepted into a pending block"
            ),
            registry
        )
        .expect("failed to register transactions_accepted counter");

        let transactions_rejected = register_int_counter_with_registry!(
            Opts::new(
                "push_transactions_rejected_total",
                "Transaction submissions rejected"
            ),
            registry
        )
        .expect("failed to register transactions_rejected counter");

        let attestation_failures = register_int_counter_with_registry!(
            Opts::new(
                "push_attestation_failures_total",
                "Block cycles aborted by attestation failures"
            ),
            registry
        )
        .expect("failed to register attestation_failures counter");

        let blocks_broadcast = register_int_counter_with_registry!(
            Opts::new(
                "push_blocks_broadcast_total",
                "Confirmed blocks broadcast to subscribers"
            ),
            registry
        )
        .expect("failed to register blocks_broadcast counter");

        let healthy_archive_nodes = register_int_gauge_with_registry!(
            Opts::new(
                "push_healthy_archive_nodes",
                "Healthy archival nodes in the discovery pool"
            ),
            registry
        )
        .expect("failed to register healthy_archive_nodes gauge");

        let connected_subscribers = register_int_gauge_with_registry!(
            Opts::new(
                "push_connected_subscribers",
                "Currently connected downstream subscribers"
            ),
            registry
        )
        .expect("failed to register connected_subscribers gauge");

        Self {
            registry,
            blocks_produced,
            transactions_accepted,
            transactions_rejected,
            attestation_failures,
            blocks_broadcast,
            healthy_archive_nodes,
            connected_subscribers,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_count() {
        let metrics = NodeMetrics::new();
        metrics.blocks_produced.inc();
        metrics.transactions_accepted.inc_by(3);
        metrics.healthy_archive_nodes.set(2);

        assert_eq!(metrics.blocks_produced.get(), 1);
        assert_eq!(metrics.transactions_accepted.get(), 3);
        assert_eq!(metrics.healthy_archive_nodes.get(), 2);
        assert!(!metrics.registry.gather().is_empty());
    }
}
