//! Signal Hub
//!
//! WebRTC signalling server: peer-to-peer relay of negotiation messages and
//! room broadcast over WebSockets.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (plain or JSON output)
//! 3. Initialize Prometheus metrics recorder
//! 4. Build the room table, registry actor and message router
//! 5. Bind the HTTP listener (WebSocket, health, status, admin, metrics)
//! 6. Mark ready and serve until Ctrl+C or SIGTERM
//!
//! # Shutdown Flow
//!
//! 1. Mark not ready so load balancers stop sending new connections
//! 2. Close every registered connection (bounded by the grace period)
//! 3. Stop the HTTP server

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use signal_hub::actors::ConnectionRegistryHandle;
use signal_hub::config::Config;
use signal_hub::observability::{init_metrics_recorder, HealthState};
use signal_hub::rooms::RoomTable;
use signal_hub::router::MessageRouter;
use signal_hub::routes::{build_routes, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the HTTP server to finish after shutdown starts.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let log_json = config.as_ref().is_ok_and(|c| c.log_json);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_hub=info,hub=info,tower_http=info".into()),
        )
        .with(log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!log_json).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting Signal Hub");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        registry_channel_buffer = config.registry_channel_buffer,
        outbound_queue_size = config.outbound_queue_size,
        max_message_bytes = config.max_message_bytes,
        prune_empty_rooms = config.prune_empty_rooms,
        shutdown_grace_seconds = config.shutdown_grace_seconds,
        "Configuration loaded successfully"
    );

    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Core components
    let rooms = RoomTable::new(config.prune_empty_rooms);
    let registry =
        ConnectionRegistryHandle::new(Arc::clone(&rooms), config.registry_channel_buffer);
    let router = MessageRouter::new(registry.clone(), rooms);
    info!("Connection registry started");

    let shutdown_token = CancellationToken::new();
    let state = AppState::new(router, &config, shutdown_token.child_token());

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = build_routes(state, Arc::clone(&health_state)).merge(metrics_router);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind listener");
        format!("Failed to bind listener to {addr}: {e}")
    })?;
    info!(addr = %addr, "Listener bound successfully");

    let server_shutdown_token = shutdown_token.clone();
    let server = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_shutdown_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health_state.set_ready();
    info!(addr = %addr, "Signal Hub running - press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so no new clients are routed here
    health_state.set_not_ready();

    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    match tokio::time::timeout(grace, registry.shutdown()).await {
        Ok(Ok(closed)) => info!(closed, "All connections closed"),
        Ok(Err(e)) => warn!(error = %e, "Registry shutdown error"),
        Err(_) => {
            warn!(
                grace_seconds = config.shutdown_grace_seconds,
                "Registry shutdown timed out, cancelling"
            );
            registry.cancel();
        }
    }

    shutdown_token.cancel();
    if tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server).await.is_err() {
        warn!("HTTP server did not stop within drain timeout");
    }

    info!("Signal Hub shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation failure is unrecoverable"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation failure is unrecoverable"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
