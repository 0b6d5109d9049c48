//! Observability module for the Signal Hub.
//!
//! # Privacy by Default
//!
//! Message content is never logged; logs carry client IDs, room IDs and
//! message types only. Metric labels are bounded (see [`metrics`]).
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `hub_connections_active` | Gauge | none | Registered connections |
//! | `hub_rooms_active` | Gauge | none | Rooms in the room table |
//! | `hub_actor_mailbox_depth` | Gauge | `actor_type` | Registry backpressure |
//! | `hub_messages_total` | Counter | `message_type` | Inbound messages routed |
//! | `hub_message_latency_seconds` | Histogram | `message_type` | Routing latency |
//! | `hub_malformed_messages_total` | Counter | none | Unparseable frames |
//! | `hub_routing_noop_total` | Counter | `reason` | Messages that routed nowhere |
//! | `hub_delivery_failures_total` | Counter | `kind` | Failed per-connection sends |
//! | `hub_connections_superseded_total` | Counter | none | Reconnects that replaced a live connection |
//! | `hub_evictions_total` | Counter | none | Admin evictions |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
