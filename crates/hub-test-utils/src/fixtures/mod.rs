//! Pre-configured test data for hub testing.
//!
//! Provides:
//! - `MessageBuilder` for wire messages
//! - `TestHub`, a router wired to a fresh registry and room table

use crate::mock_transport::{MockTransport, TransportProbe};

use bytes::Bytes;
use serde_json::value::RawValue;
use signal_hub::actors::{ConnectionRegistryHandle, REGISTRY_CHANNEL_BUFFER};
use signal_hub::connection::ConnectionHandle;
use signal_hub::errors::HubError;
use signal_hub::message::{Message, MessageType};
use signal_hub::rooms::RoomTable;
use signal_hub::router::MessageRouter;
use std::sync::Arc;

/// Builder for wire messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Start a message of the given type.
    #[must_use]
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message: Message::new(message_type, ""),
        }
    }

    #[must_use]
    pub fn join_room(room_id: &str) -> Self {
        Self::new(MessageType::JoinRoom).room(room_id)
    }

    #[must_use]
    pub fn leave_room(room_id: &str) -> Self {
        Self::new(MessageType::LeaveRoom).room(room_id)
    }

    #[must_use]
    pub fn broadcast(room_id: &str) -> Self {
        Self::new(MessageType::Broadcast).room(room_id)
    }

    #[must_use]
    pub fn offer(to: &str) -> Self {
        Self::new(MessageType::Offer).to(to)
    }

    #[must_use]
    pub fn answer(to: &str) -> Self {
        Self::new(MessageType::Answer).to(to)
    }

    #[must_use]
    pub fn candidate(to: &str) -> Self {
        Self::new(MessageType::Candidate).to(to)
    }

    #[must_use]
    pub fn from(mut self, from: &str) -> Self {
        self.message.from = from.to_string();
        self
    }

    #[must_use]
    pub fn to(mut self, to: &str) -> Self {
        self.message.to = to.to_string();
        self
    }

    #[must_use]
    pub fn room(mut self, room_id: &str) -> Self {
        self.message.room_id = room_id.to_string();
        self
    }

    /// Set the content payload from a JSON literal.
    ///
    /// Panics if `json` is not valid JSON.
    #[must_use]
    pub fn content(mut self, json: &str) -> Self {
        self.message.message_content =
            Some(RawValue::from_string(json.to_string()).expect("content should be JSON"));
        self
    }

    #[must_use]
    pub fn build(self) -> Message {
        self.message
    }

    /// Encode as a frame.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.message.to_bytes().expect("message should encode")
    }
}

/// A message router over a fresh registry and room table.
///
/// Must be created inside a Tokio runtime (the registry actor is spawned).
#[derive(Debug, Clone)]
pub struct TestHub {
    pub router: MessageRouter,
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_pruning(false)
    }

    /// Hub whose room table drops rooms once they are empty.
    #[must_use]
    pub fn with_pruning(prune_empty_rooms: bool) -> Self {
        let rooms = RoomTable::new(prune_empty_rooms);
        let registry = ConnectionRegistryHandle::new(Arc::clone(&rooms), REGISTRY_CHANNEL_BUFFER);
        Self {
            router: MessageRouter::new(registry, rooms),
        }
    }

    /// Connect `client_id` over a fresh [`MockTransport`].
    ///
    /// Panics if the router refuses the connection.
    pub async fn connect(&self, client_id: &str) -> (ConnectionHandle, TransportProbe) {
        let (transport, probe) = MockTransport::new();
        let connection = self
            .router
            .handle_connect(client_id, Box::new(transport))
            .await
            .expect("connect should succeed");
        (connection, probe)
    }

    /// Route a message from `connection`, stamping `from` with its client ID
    /// unless the builder already set one.
    ///
    /// Panics if routing fails.
    pub async fn send(&self, connection: &ConnectionHandle, builder: MessageBuilder) {
        let builder = if builder.message.from.is_empty() {
            builder.from(connection.client_id())
        } else {
            builder
        };
        self.router
            .handle_inbound(connection, builder.to_bytes())
            .await
            .expect("routing should succeed");
    }

    /// Route raw bytes from `connection`.
    pub async fn send_raw(
        &self,
        connection: &ConnectionHandle,
        raw: &[u8],
    ) -> Result<(), HubError> {
        self.router
            .handle_inbound(connection, Bytes::copy_from_slice(raw))
            .await
    }
}
