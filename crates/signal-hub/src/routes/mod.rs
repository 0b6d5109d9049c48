//! HTTP routes for the Signal Hub.
//!
//! Defines the Axum router and application state.

pub mod admin;

use crate::config::Config;
use crate::observability::{health_router, HealthState};
use crate::router::MessageRouter;
use crate::transport::ws_router;

use axum::http::{HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Message router (owns the registry handle and room table).
    pub router: MessageRouter,

    /// Outbound queue capacity per WebSocket connection.
    pub outbound_queue_size: usize,

    /// Largest inbound frame accepted, in bytes.
    pub max_message_bytes: usize,

    /// Parent of every connection's cancellation token.
    pub shutdown: CancellationToken,

    /// Browser origins allowed to connect; empty disables the check.
    pub allowed_origins: Arc<[String]>,
}

impl AppState {
    #[must_use]
    pub fn new(router: MessageRouter, config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            router,
            outbound_queue_size: config.outbound_queue_size,
            max_message_bytes: config.max_message_bytes,
            shutdown,
            allowed_origins: config.allowed_origins.clone().into(),
        }
    }

    /// Whether a request carrying `origin` may open a connection.
    ///
    /// Requests without an `Origin` header (non-browser clients) always pass.
    #[must_use]
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.allowed_origins.is_empty() => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed == origin),
        }
    }
}

/// CORS policy for `allowed_origins`, or `None` when the list is empty.
fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    if allowed_origins.is_empty() {
        return None;
    }

    let allow_origin = if allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any),
    )
}

/// Build the application routes.
///
/// - `/connect`, `/ws` - WebSocket signalling endpoint
/// - `/healthz`, `/health`, `/ready` - Liveness and readiness probes
/// - `/status` - Registry and room table summary
/// - `/admin/clients/:client_id/evict` - Force-disconnect a client
///
/// `/metrics` is added by the binary, which owns the Prometheus handle.
pub fn build_routes(state: AppState, health_state: Arc<HealthState>) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    let app = ws_router(state.clone())
        .merge(admin::admin_router(state))
        .merge(health_router(health_state));

    let app = match cors {
        Some(cors) => app.layer(cors),
        None => app,
    };
    app.layer(TraceLayer::new_for_http())
}
