//! WebSocket transport (axum).
//!
//! `GET /connect?client_id=<id>` (or `/ws`) upgrades to a WebSocket. Each
//! socket is split:
//!
//! - the writer task drains a bounded outbound queue into the socket
//! - the reader loop hands every text or binary frame to the router
//!
//! [`WsTransport`] is the router-facing half. `send` is a `try_send` into the
//! outbound queue, so a slow client only ever loses its own messages.
//! `close` queues a close frame and cancels the connection's token, which
//! stops the reader and (once the queue is drained) the writer.

use crate::actors::{ActorType, MailboxMonitor};
use crate::connection::ConnectionHandle;
use crate::errors::{HubError, TransportError};
use crate::message::Message;
use crate::observability::metrics;
use crate::routes::AppState;

use super::Transport;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Item in a connection's outbound queue.
#[derive(Debug)]
pub enum Outbound {
    Frame(Bytes),
    Close,
}

/// Receiving side of a [`WsTransport`], consumed by the writer task.
#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::Receiver<Outbound>,
    mailbox: Arc<MailboxMonitor>,
}

impl OutboundQueue {
    /// Next queued item, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        let item = self.receiver.recv().await;
        if matches!(item, Some(Outbound::Frame(_))) {
            self.mailbox.record_dequeue();
        }
        item
    }
}

/// Router-facing half of one WebSocket.
#[derive(Debug)]
pub struct WsTransport {
    client_id: String,
    sender: mpsc::Sender<Outbound>,
    mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
    closed: AtomicBool,
}

impl WsTransport {
    /// Create a transport with an outbound queue of `queue_size` frames.
    ///
    /// `cancel_token` is cancelled when the transport is closed.
    #[must_use]
    pub fn new(
        client_id: &str,
        queue_size: usize,
        cancel_token: CancellationToken,
    ) -> (Self, OutboundQueue) {
        // One extra slot so a close can still be queued behind a full queue.
        let (sender, receiver) = mpsc::channel(queue_size.max(1) + 1);
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Writer, client_id));

        let transport = Self {
            client_id: client_id.to_string(),
            sender,
            mailbox: Arc::clone(&mailbox),
            cancel_token,
            closed: AtomicBool::new(false),
        };
        (transport, OutboundQueue { receiver, mailbox })
    }

    fn queue_limit(&self) -> usize {
        self.sender.max_capacity().saturating_sub(1)
    }
}

impl Transport for WsTransport {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.mailbox.current_depth() >= self.queue_limit() {
            self.mailbox.record_enqueue();
            self.mailbox.record_drop();
            return Err(TransportError::QueueFull);
        }

        self.mailbox.record_enqueue();
        match self.sender.try_send(Outbound::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                Err(TransportError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.mailbox.record_drop();
                Err(TransportError::Closed)
            }
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }

        if self.sender.try_send(Outbound::Close).is_err() {
            debug!(
                target: "hub.transport",
                client_id = %self.client_id,
                "Close frame not queued, cancelling writer"
            );
        }
        self.cancel_token.cancel();
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    client_id: Option<String>,
}

/// Router with the `GET /connect` and `GET /ws` upgrade endpoints.
pub fn ws_router(state: AppState) -> Router {
    Router::new()
        .route("/connect", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let origin = headers
        .get(ORIGIN)
        .map(|value| value.to_str().unwrap_or_default());
    if !state.origin_allowed(origin) {
        warn!(
            target: "hub.transport",
            origin = ?origin,
            "Connection from disallowed origin rejected"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    let client_id = params.client_id.unwrap_or_default();
    if client_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            HubError::MissingClientId.client_message(),
        )
            .into_response();
    }

    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

#[instrument(skip_all, name = "hub.transport.ws", fields(client_id = %client_id))]
async fn handle_socket(socket: WebSocket, client_id: String, state: AppState) {
    let cancel_token = state.shutdown.child_token();
    let (transport, queue) =
        WsTransport::new(&client_id, state.outbound_queue_size, cancel_token.clone());

    let connection = match state
        .router
        .handle_connect(&client_id, Box::new(transport))
        .await
    {
        Ok(connection) => connection,
        Err(e) => {
            warn!(
                target: "hub.transport",
                error = %e,
                "Connection refused"
            );
            let mut socket = socket;
            if let Ok(frame) = Message::error(&e.client_message()).to_bytes() {
                let _ = socket.send(to_ws_message(frame)).await;
            }
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };

    let (ws_tx, mut ws_rx) = socket.split();
    tokio::spawn(run_writer(ws_tx, queue, cancel_token.clone()));

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(target: "hub.transport", "Connection cancelled");
                break;
            }

            msg = ws_rx.next() => {
                let frame = match msg {
                    Some(Ok(WsMessage::Text(text))) => Bytes::from(text),
                    Some(Ok(WsMessage::Binary(data))) => Bytes::from(data),
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Ping/pong are answered by axum
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(target: "hub.transport", error = %e, "WebSocket read failed");
                        break;
                    }
                };

                if frame.len() > state.max_message_bytes {
                    warn!(
                        target: "hub.transport",
                        size = frame.len(),
                        limit = state.max_message_bytes,
                        "Inbound frame too large"
                    );
                    metrics::record_malformed_message();
                    reply_error(
                        &connection,
                        &HubError::MalformedMessage(format!(
                            "frame of {} bytes exceeds {} byte limit",
                            frame.len(),
                            state.max_message_bytes
                        )),
                    );
                    continue;
                }

                if let Err(e) = state.router.handle_inbound(&connection, frame).await {
                    reply_error(&connection, &e);
                }
            }
        }
    }

    state.router.handle_disconnect(&connection).await;
    cancel_token.cancel();
}

/// Drain the outbound queue into the socket.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut queue: OutboundQueue,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            item = queue.recv() => {
                match item {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = ws_tx.send(to_ws_message(frame)).await {
                            debug!(target: "hub.transport", error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    Some(Outbound::Close) => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }

            () = cancel_token.cancelled() => break,
        }
    }

    // Writer gone means nothing more can be delivered; stop the reader too.
    cancel_token.cancel();
    info!(
        target: "hub.transport",
        dropped = queue.mailbox.messages_dropped(),
        peak_depth = queue.mailbox.peak_depth(),
        "Writer stopped"
    );
}

fn to_ws_message(frame: Bytes) -> WsMessage {
    match String::from_utf8(frame.to_vec()) {
        Ok(text) => WsMessage::Text(text),
        Err(e) => WsMessage::Binary(e.into_bytes()),
    }
}

fn reply_error(connection: &ConnectionHandle, error: &HubError) {
    if let Err(e) = connection.write(&Message::error(&error.client_message())) {
        debug!(
            target: "hub.transport",
            client_id = %connection.client_id(),
            error = %e,
            "Failed to send error reply"
        );
    }
}
