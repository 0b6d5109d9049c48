//! `Connection` - one live transport bound to one client identifier.
//!
//! Each `Connection`:
//! - Exclusively owns its [`Transport`]
//! - Tracks the set of rooms it believes it is a member of
//! - Carries a process-unique `connection_id` so a stale connection can be
//!   told apart from a newer one registered under the same client identifier
//!
//! # Lifecycle
//!
//! 1. Created by the router when the transport reports a handshake
//! 2. Registered with the connection registry
//! 3. Torn down exactly once: rooms left, registry entry removed, transport closed

use crate::errors::{HubError, TransportError};
use crate::message::Message;
use crate::transport::Transport;

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Shared handle to a connection.
pub type ConnectionHandle = Arc<Connection>;

/// A live client connection.
#[derive(Debug)]
pub struct Connection {
    /// Client identifier supplied at connect time.
    client_id: String,
    /// Unique per connection instance.
    connection_id: String,
    /// Outbound transport.
    transport: Box<dyn Transport>,
    /// Rooms this connection has joined.
    rooms: RwLock<HashSet<String>>,
    /// Set once teardown has started.
    torn_down: AtomicBool,
}

impl Connection {
    /// Create a new connection for `client_id` over `transport`.
    #[must_use]
    pub fn new(client_id: impl Into<String>, transport: Box<dyn Transport>) -> ConnectionHandle {
        Arc::new(Self {
            client_id: client_id.into(),
            connection_id: uuid::Uuid::new_v4().to_string(),
            transport,
            rooms: RwLock::new(HashSet::new()),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Get the client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Whether `other` is this very connection instance.
    #[must_use]
    pub fn same_as(&self, other: &Connection) -> bool {
        self.connection_id == other.connection_id
    }

    /// Send a pre-encoded frame.
    pub fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.transport.send(frame)
    }

    /// Encode and send a message.
    pub fn write(&self, message: &Message) -> Result<(), HubError> {
        let frame = message
            .to_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.send(frame)?;

        debug!(
            target: "hub.connection",
            client_id = %self.client_id,
            message_type = %message.message_type,
            "Wrote message to client"
        );
        Ok(())
    }

    /// Close the underlying transport.
    pub fn close(&self) -> Result<(), TransportError> {
        self.transport.close()
    }

    /// Snapshot of the rooms this connection belongs to.
    pub async fn rooms(&self) -> Vec<String> {
        self.rooms.read().await.iter().cloned().collect()
    }

    /// Whether this connection believes it is in `room_id`.
    pub async fn is_in_room(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains(room_id)
    }

    pub(crate) async fn mark_joined(&self, room_id: &str) {
        self.rooms.write().await.insert(room_id.to_string());
    }

    pub(crate) async fn mark_left(&self, room_id: &str) {
        self.rooms.write().await.remove(room_id);
    }

    /// Claim the teardown of this connection.
    ///
    /// Returns `true` for exactly one caller; every later call returns `false`.
    pub(crate) fn begin_teardown(&self) -> bool {
        let first = !self.torn_down.swap(true, Ordering::AcqRel);
        if !first {
            debug!(
                target: "hub.connection",
                client_id = %self.client_id,
                connection_id = %self.connection_id,
                "Teardown already in progress"
            );
        }
        first
    }

    /// Whether teardown has started.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Close the transport, logging instead of failing.
    pub(crate) fn close_logged(&self) {
        match self.close() {
            Ok(()) | Err(TransportError::Closed) => {}
            Err(e) => {
                warn!(
                    target: "hub.connection",
                    client_id = %self.client_id,
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to close transport"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use crate::test_support::RecordingTransport;

    #[tokio::test]
    async fn test_connection_ids() {
        let (transport, _probe) = RecordingTransport::new();
        let a = Connection::new("alice", Box::new(transport));
        let (transport, _probe) = RecordingTransport::new();
        let b = Connection::new("alice", Box::new(transport));

        assert_eq!(a.client_id(), "alice");
        assert_ne!(a.connection_id(), b.connection_id());
        assert!(a.same_as(&a));
        assert!(!a.same_as(&b));
    }

    #[tokio::test]
    async fn test_write_encodes_message() {
        let (transport, probe) = RecordingTransport::new();
        let conn = Connection::new("alice", Box::new(transport));

        conn.write(&Message::new(MessageType::Ack, "hub")).unwrap();

        let frames = probe.frames();
        assert_eq!(frames.len(), 1);
        let json: serde_json::Value = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(json["messageType"], "ack");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (transport, probe) = RecordingTransport::new();
        let conn = Connection::new("alice", Box::new(transport));

        conn.close().unwrap();
        assert!(probe.is_closed());
        assert_eq!(
            conn.send(Bytes::from_static(b"{}")),
            Err(TransportError::Closed)
        );
        assert_eq!(conn.close(), Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_room_tracking() {
        let (transport, _probe) = RecordingTransport::new();
        let conn = Connection::new("alice", Box::new(transport));

        conn.mark_joined("lobby").await;
        assert!(conn.is_in_room("lobby").await);
        assert_eq!(conn.rooms().await, vec!["lobby".to_string()]);

        conn.mark_left("lobby").await;
        assert!(!conn.is_in_room("lobby").await);
    }

    #[tokio::test]
    async fn test_teardown_claimed_once() {
        let (transport, _probe) = RecordingTransport::new();
        let conn = Connection::new("alice", Box::new(transport));

        assert!(!conn.is_torn_down());
        assert!(conn.begin_teardown());
        assert!(!conn.begin_teardown());
        assert!(conn.is_torn_down());
    }
}
