//! Status and administration handlers.
//!
//! - `GET /status` - Connection, room and registry mailbox summary
//! - `POST /admin/clients/:client_id/evict` - Force-disconnect a client
//!
//! These routes are unauthenticated and meant for the internal network only.

use crate::actors::RegistryStatus;
use crate::errors::HubError;
use crate::routes::AppState;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info, instrument};

/// Response body for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connections: usize,
    pub rooms: usize,
    pub registry: RegistryStatus,
}

/// Router with the status and admin endpoints.
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/admin/clients/:client_id/evict", post(evict_handler))
        .with_state(state)
}

/// Handler for GET /status
///
/// - 200 OK with a [`StatusResponse`]
/// - 503 Service Unavailable once the registry has stopped
async fn status_handler(State(state): State<AppState>) -> Response {
    match state.router.registry().status().await {
        Ok(registry) => Json(StatusResponse {
            connections: registry.connection_count,
            rooms: state.router.rooms().room_count().await,
            registry,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handler for POST /admin/clients/:client_id/evict
///
/// - 204 No Content: client was connected and has been disconnected
/// - 404 Not Found: no connection for that client ID
#[instrument(skip_all, name = "hub.admin.evict", fields(client_id = %client_id))]
async fn evict_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Response {
    match state.router.registry().evict(&client_id).await {
        Ok(true) => {
            info!(target: "hub.admin", "Client evicted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &HubError) -> Response {
    error!(target: "hub.admin", error = %e, error_code = e.error_code(), "Admin request failed");
    let status = match e {
        HubError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.client_message()).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ConnectionRegistryHandle, REGISTRY_CHANNEL_BUFFER};
    use crate::router::MessageRouter;
    use crate::rooms::RoomTable;
    use crate::test_support::RecordingTransport;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    fn state() -> AppState {
        let rooms = RoomTable::new(false);
        let registry = ConnectionRegistryHandle::new(Arc::clone(&rooms), REGISTRY_CHANNEL_BUFFER);
        AppState {
            router: MessageRouter::new(registry, rooms),
            outbound_queue_size: 8,
            max_message_bytes: 1024,
            shutdown: CancellationToken::new(),
            allowed_origins: Arc::from(Vec::<String>::new()),
        }
    }

    fn evict_request(client_id: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/admin/clients/{client_id}/evict"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_evict_connected_client() {
        let state = state();
        let (transport, probe) = RecordingTransport::new();
        state
            .router
            .handle_connect("alice", Box::new(transport))
            .await
            .unwrap();

        let response = admin_router(state.clone())
            .oneshot(evict_request("alice"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(probe.is_closed());
        assert!(state.router.registry().lookup("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_unknown_client_is_404() {
        let response = admin_router(state())
            .oneshot(evict_request("nobody"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_after_shutdown_is_503() {
        let state = state();
        state.router.registry().shutdown().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let response = admin_router(state)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
