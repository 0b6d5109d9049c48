//! End-to-end WebSocket sessions against a bound listener.
//!
//! These drive the real axum upgrade path with a tungstenite client: reader
//! loop, writer task, error replies, eviction and disconnect.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hub_test_utils::{MessageBuilder, TestHub};
use serde_json::Value;
use signal_hub::config::Config;
use signal_hub::observability::HealthState;
use signal_hub::routes::{build_routes, AppState};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);
const MAX_MESSAGE_BYTES: usize = 512;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Serve the hub routes on an ephemeral port.
async fn boot_server(hub: &TestHub) -> SocketAddr {
    let vars = HashMap::from([(
        "HUB_MAX_MESSAGE_BYTES".to_string(),
        MAX_MESSAGE_BYTES.to_string(),
    )]);
    let config = Config::from_vars(&vars).unwrap();
    let state = AppState::new(hub.router.clone(), &config, CancellationToken::new());
    let app = build_routes(state, Arc::new(HealthState::new()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Open a socket for `client_id` and wait until the hub has registered it.
async fn connect(hub: &TestHub, addr: SocketAddr, client_id: &str) -> WsStream {
    let url = format!("ws://{addr}/connect?client_id={client_id}");
    let (ws, _) = connect_async(url.as_str()).await.unwrap();

    let registry = hub.router.registry();
    timeout(TIMEOUT, async {
        while registry.lookup(client_id).await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client should be registered");
    ws
}

async fn next_message(ws: &mut WsStream) -> Message {
    timeout(TIMEOUT, ws.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .unwrap()
}

async fn next_text(ws: &mut WsStream) -> String {
    match next_message(ws).await {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn next_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_connection_stays_open() {
    let hub = TestHub::new();
    let addr = boot_server(&hub).await;
    let mut alice = connect(&hub, addr, "alice").await;
    let mut bob = connect(&hub, addr, "bob").await;

    send_text(&mut alice, "definitely not json").await;
    let reply = next_json(&mut alice).await;
    assert_eq!(reply["messageType"], "error");
    assert_eq!(reply["messageContent"], "Invalid message format");

    // Same socket still routes.
    let offer = String::from_utf8(
        MessageBuilder::offer("bob")
            .from("alice")
            .content(r#"{"sdp":"v=0"}"#)
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    send_text(&mut alice, &offer).await;
    assert_eq!(next_text(&mut bob).await, offer);
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
    let hub = TestHub::new();
    let addr = boot_server(&hub).await;
    let mut alice = connect(&hub, addr, "alice").await;
    let mut bob = connect(&hub, addr, "bob").await;

    let padding = "x".repeat(MAX_MESSAGE_BYTES);
    let oversized = format!(
        r#"{{"from":"alice","to":"bob","messageType":"offer","messageContent":"{padding}"}}"#
    );
    send_text(&mut alice, &oversized).await;

    let reply = next_json(&mut alice).await;
    assert_eq!(reply["messageType"], "error");

    // Nothing reached bob; the next small frame does.
    let candidate = r#"{"from":"alice","to":"bob","messageType":"candidate"}"#;
    send_text(&mut alice, candidate).await;
    assert_eq!(next_text(&mut bob).await, candidate);
}

#[tokio::test]
async fn test_room_broadcast_over_sockets() {
    let hub = TestHub::new();
    let addr = boot_server(&hub).await;
    let mut alice = connect(&hub, addr, "alice").await;
    let mut bob = connect(&hub, addr, "bob").await;

    send_text(&mut alice, r#"{"from":"alice","roomId":"lobby","messageType":"joinRoom"}"#).await;
    send_text(&mut bob, r#"{"from":"bob","roomId":"lobby","messageType":"joinRoom"}"#).await;

    let rooms = hub.router.rooms();
    timeout(TIMEOUT, async {
        while rooms.members("lobby").await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both clients should join");

    let broadcast = r#"{"from":"bob","roomId":"lobby","messageType":"broadcast","messageContent":{"hi":true}}"#;
    send_text(&mut bob, broadcast).await;
    assert_eq!(next_text(&mut alice).await, broadcast);
}

#[tokio::test]
async fn test_client_close_unregisters() {
    let hub = TestHub::new();
    let addr = boot_server(&hub).await;
    let mut alice = connect(&hub, addr, "alice").await;

    alice.close(None).await.unwrap();

    let registry = hub.router.registry();
    timeout(TIMEOUT, async {
        while registry.lookup("alice").await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed client should be unregistered");
    assert_eq!(registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_eviction_sends_close_frame() {
    let hub = TestHub::new();
    let addr = boot_server(&hub).await;
    let mut bob = connect(&hub, addr, "bob").await;

    assert!(hub.router.registry().evict("bob").await.unwrap());

    match next_message(&mut bob).await {
        Message::Close(_) => {}
        other => panic!("expected a close frame, got {other:?}"),
    }
    assert!(hub.router.registry().lookup("bob").await.is_none());
}

#[tokio::test]
async fn test_reconnect_closes_previous_socket() {
    let hub = TestHub::new();
    let addr = boot_server(&hub).await;
    let mut first = connect(&hub, addr, "alice").await;
    let first_conn = hub.router.registry().lookup("alice").await.unwrap();

    let url = format!("ws://{addr}/connect?client_id=alice");
    let (_second, _) = connect_async(url.as_str()).await.unwrap();

    match next_message(&mut first).await {
        Message::Close(_) => {}
        other => panic!("expected a close frame, got {other:?}"),
    }

    let registry = hub.router.registry();
    timeout(TIMEOUT, async {
        loop {
            if let Some(current) = registry.lookup("alice").await {
                if !current.same_as(&first_conn) {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("newest socket should own the client ID");
}
