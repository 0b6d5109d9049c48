//! Message routing.
//!
//! The router is what transports talk to. It turns connect, inbound-frame and
//! disconnect notifications into registry and room table operations:
//!
//! | Message type                   | Action                                  |
//! |--------------------------------|-----------------------------------------|
//! | `joinRoom`                     | join the sender to `roomId`             |
//! | `leaveRoom`                    | remove the sender from `roomId`         |
//! | `broadcast`                    | relay the frame to the rest of `roomId` |
//! | `offer` / `answer` / `candidate` | relay the frame to the client `to`    |
//! | anything else                  | logged, no-op                           |
//!
//! Relayed frames are the original inbound bytes; the hub never re-encodes
//! or rewrites a client's message.

use crate::actors::ConnectionRegistryHandle;
use crate::connection::{Connection, ConnectionHandle};
use crate::errors::{HubError, TransportError};
use crate::message::{Message, MessageType};
use crate::observability::metrics;
use crate::rooms::RoomTable;
use crate::transport::Transport;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Dispatches transport events to the registry and room table.
#[derive(Clone, Debug)]
pub struct MessageRouter {
    registry: ConnectionRegistryHandle,
    rooms: Arc<RoomTable>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(registry: ConnectionRegistryHandle, rooms: Arc<RoomTable>) -> Self {
        Self { registry, rooms }
    }

    /// Registry handle.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistryHandle {
        &self.registry
    }

    /// Room table.
    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomTable> {
        &self.rooms
    }

    /// A transport completed its handshake for `client_id`.
    ///
    /// # Errors
    ///
    /// - `MissingClientId` if `client_id` is empty (the transport is closed)
    /// - `ShuttingDown` if the registry no longer accepts connections
    pub async fn handle_connect(
        &self,
        client_id: &str,
        transport: Box<dyn Transport>,
    ) -> Result<ConnectionHandle, HubError> {
        if client_id.is_empty() {
            warn!(target: "hub.router", "Connection without client ID rejected");
            match transport.close() {
                Ok(()) | Err(TransportError::Closed) => {}
                Err(e) => {
                    warn!(
                        target: "hub.router",
                        error = %e,
                        "Failed to close rejected transport"
                    );
                }
            }
            return Err(HubError::MissingClientId);
        }

        let connection = Connection::new(client_id, transport);
        self.registry.register(Arc::clone(&connection)).await?;

        info!(
            target: "hub.router",
            client_id = %client_id,
            connection_id = %connection.connection_id(),
            "Client connected"
        );
        Ok(connection)
    }

    /// Route one inbound frame from `connection`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the frame is not a valid message. No
    /// state is touched in that case. Routing no-ops and failed deliveries
    /// are logged, not returned.
    pub async fn handle_inbound(
        &self,
        connection: &ConnectionHandle,
        frame: Bytes,
    ) -> Result<(), HubError> {
        let start = Instant::now();

        let message = match Message::from_bytes(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    target: "hub.router",
                    client_id = %connection.client_id(),
                    error = %e,
                    "Malformed message"
                );
                metrics::record_malformed_message();
                return Err(e);
            }
        };

        debug!(
            target: "hub.router",
            client_id = %connection.client_id(),
            message_type = %message.message_type,
            "Routing message"
        );

        match &message.message_type {
            MessageType::JoinRoom => self.rooms.join(connection, &message.room_id).await,
            MessageType::LeaveRoom => self.rooms.leave(connection, &message.room_id).await,
            MessageType::Broadcast => {
                self.rooms
                    .broadcast(connection, &message.room_id, &frame)
                    .await;
            }
            t if t.is_negotiation() => self.forward(connection, &message, frame).await,
            other => {
                debug!(
                    target: "hub.router",
                    client_id = %connection.client_id(),
                    message_type = %other,
                    "Unhandled message type"
                );
                metrics::record_routing_noop("unhandled_type");
            }
        }

        metrics::record_message(message.message_type.metric_label(), start.elapsed());
        Ok(())
    }

    /// Relay a negotiation frame to the client named in `to`.
    async fn forward(&self, connection: &Connection, message: &Message, frame: Bytes) {
        let target = if message.to.is_empty() {
            None
        } else {
            self.registry.lookup(&message.to).await
        };

        let Some(target) = target else {
            debug!(
                target: "hub.router",
                client_id = %connection.client_id(),
                to = %message.to,
                message_type = %message.message_type,
                "Forward target not connected"
            );
            metrics::record_routing_noop("peer_not_found");
            return;
        };

        if let Err(e) = target.send(frame) {
            warn!(
                target: "hub.router",
                client_id = %connection.client_id(),
                to = %message.to,
                message_type = %message.message_type,
                error = %e,
                "Forward delivery failed"
            );
            metrics::record_delivery_failure(e.as_str());
        }
    }

    /// The transport for `connection` went away.
    ///
    /// Leaves every room the connection joined, then unregisters it (which
    /// closes the transport). Only the first teardown of a connection does
    /// anything, whether it comes from here, an eviction or a replacement.
    pub async fn handle_disconnect(&self, connection: &ConnectionHandle) {
        if !connection.begin_teardown() {
            return;
        }

        self.rooms.leave_all(connection).await;

        if let Err(e) = self.registry.unregister(Arc::clone(connection)).await {
            debug!(
                target: "hub.router",
                client_id = %connection.client_id(),
                error = %e,
                "Unregister failed, closing transport directly"
            );
            connection.close_logged();
        }

        info!(
            target: "hub.router",
            client_id = %connection.client_id(),
            connection_id = %connection.connection_id(),
            "Client disconnected"
        );
    }
}
