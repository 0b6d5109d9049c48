//! Metrics definitions for the Signal Hub.
//!
//! All metrics follow Prometheus naming conventions:
//! - `hub_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `message_type`: 16 values (known tags plus `other`)
//! - `reason`: routing no-op reasons (5 values)
//! - `kind`: transport failure kinds (3 values)
//! - `actor_type`: 1 value today (registry)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Routing latency buckets - in-memory work, sub-millisecond expected
        .set_buckets_for_metric(
            Matcher::Prefix("hub_message".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of registered connections.
///
/// Metric: `hub_connections_active`
pub fn set_connections_active(count: usize) {
    // usize to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("hub_connections_active").set(count as f64);
}

/// Set the number of rooms in the room table.
///
/// Metric: `hub_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("hub_rooms_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `hub_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("hub_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Routing
// ============================================================================

/// Record an inbound message and its routing latency.
///
/// Metrics: `hub_messages_total`, `hub_message_latency_seconds`
/// Labels: `message_type`
pub fn record_message(message_type: &str, duration: Duration) {
    counter!("hub_messages_total", "message_type" => message_type.to_string()).increment(1);
    histogram!("hub_message_latency_seconds", "message_type" => message_type.to_string())
        .record(duration.as_secs_f64());
}

/// Record an inbound frame that failed to parse.
///
/// Metric: `hub_malformed_messages_total`
pub fn record_malformed_message() {
    counter!("hub_malformed_messages_total").increment(1);
}

/// Record a routing decision that completed without delivering anything.
///
/// Metric: `hub_routing_noop_total`
/// Labels: `reason` (`empty_room_id`, `unknown_room`, `not_a_member`,
/// `peer_not_found`, `unhandled_type`)
pub fn record_routing_noop(reason: &str) {
    counter!("hub_routing_noop_total", "reason" => reason.to_string()).increment(1);
}

/// Record a failed send to a single connection.
///
/// Metric: `hub_delivery_failures_total`
/// Labels: `kind` (`closed`, `queue_full`, `encode`)
pub fn record_delivery_failure(kind: &str) {
    counter!("hub_delivery_failures_total", "kind" => kind.to_string()).increment(1);
}

/// Record a connection replaced by a newer one with the same client ID.
///
/// Metric: `hub_connections_superseded_total`
pub fn record_connection_superseded() {
    counter!("hub_connections_superseded_total").increment(1);
}

/// Record an administrative eviction.
///
/// Metric: `hub_evictions_total`
pub fn record_eviction() {
    counter!("hub_evictions_total").increment(1);
}
