//! Message types for the connection registry actor.
//!
//! Requests are sent over a bounded `tokio::sync::mpsc` channel and answered
//! through a `tokio::sync::oneshot` responder.

use crate::connection::ConnectionHandle;
use crate::errors::HubError;

use serde::Serialize;
use tokio::sync::oneshot;

/// Messages sent to `ConnectionRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Insert or replace the entry for the connection's client ID.
    Register {
        connection: ConnectionHandle,
        /// Fails with `ShuttingDown` once shutdown has started.
        respond_to: oneshot::Sender<Result<(), HubError>>,
    },

    /// Remove the entry if it still points at this connection, then close it.
    Unregister {
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<()>,
    },

    /// Force-disconnect whichever connection holds this client ID.
    Evict {
        client_id: String,
        /// `true` if a connection was evicted.
        respond_to: oneshot::Sender<bool>,
    },

    /// Get current registry status.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Close every registered connection and stop accepting registrations.
    Shutdown {
        /// Number of connections closed.
        respond_to: oneshot::Sender<usize>,
    },
}

impl RegistryMessage {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RegistryMessage::Register { .. } => "register",
            RegistryMessage::Unregister { .. } => "unregister",
            RegistryMessage::Evict { .. } => "evict",
            RegistryMessage::GetStatus { .. } => "get_status",
            RegistryMessage::Shutdown { .. } => "shutdown",
        }
    }
}

/// Status of the `ConnectionRegistryActor`.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    /// Registered connections.
    pub connection_count: usize,
    /// Requests waiting in the mailbox.
    pub mailbox_depth: usize,
    /// Requests processed since start.
    pub messages_processed: u64,
    /// Whether shutdown has started.
    pub is_shutting_down: bool,
}
