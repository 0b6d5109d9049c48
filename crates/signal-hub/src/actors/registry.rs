//! `ConnectionRegistryActor` - the authoritative client ID -> connection map.
//!
//! Mutations (register, unregister, evict, shutdown) are serialized through
//! this single actor so that replacing a stale entry and closing a removed
//! transport never interleave for the same client ID. Lookups bypass the
//! actor and read the shared map under a read lock.
//!
//! # Replacement
//!
//! Registering a client ID that already maps to a different connection
//! replaces the entry and tears the superseded connection down: it leaves
//! all its rooms and its transport is closed.
//!
//! # Shutdown
//!
//! On `Shutdown` (or cancellation) the actor tears down every registered
//! connection and stops accepting registrations.

use crate::connection::ConnectionHandle;
use crate::errors::HubError;
use crate::observability::metrics;
use crate::rooms::RoomTable;

use super::messages::{RegistryMessage, RegistryStatus};
use super::metrics::{ActorType, MailboxMonitor};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
pub const REGISTRY_CHANNEL_BUFFER: usize = 1000;

type ConnectionMap = Arc<RwLock<HashMap<String, ConnectionHandle>>>;

/// Handle to the `ConnectionRegistryActor`.
///
/// Cheap to clone. Mutating methods round-trip through the actor; `lookup`
/// reads the shared map directly.
#[derive(Clone, Debug)]
pub struct ConnectionRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    connections: ConnectionMap,
    mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
}

impl ConnectionRegistryHandle {
    /// Spawn the registry actor and return a handle to it.
    ///
    /// `rooms` is used to tear down superseded and evicted connections.
    #[must_use]
    pub fn new(rooms: Arc<RoomTable>, channel_buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(channel_buffer.max(1));
        let connections: ConnectionMap = Arc::new(RwLock::new(HashMap::new()));
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Registry, "registry"));
        let cancel_token = CancellationToken::new();

        let actor = ConnectionRegistryActor {
            receiver,
            connections: Arc::clone(&connections),
            rooms,
            mailbox: Arc::clone(&mailbox),
            cancel_token: cancel_token.clone(),
            shutting_down: false,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            connections,
            mailbox,
            cancel_token,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();

        self.mailbox.record_enqueue();
        if self.sender.send(build(tx)).await.is_err() {
            self.mailbox.record_drop();
            return Err(HubError::ShuttingDown);
        }

        rx.await
            .map_err(|e| HubError::Internal(format!("response receive failed: {e}")))
    }

    /// Register a connection, replacing any previous connection for its client ID.
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        self.request(|respond_to| RegistryMessage::Register {
            connection,
            respond_to,
        })
        .await?
    }

    /// Remove the connection's entry (if it is still the registered one) and
    /// close its transport. Idempotent.
    pub async fn unregister(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        self.request(|respond_to| RegistryMessage::Unregister {
            connection,
            respond_to,
        })
        .await
    }

    /// Current connection for `client_id`, if any.
    pub async fn lookup(&self, client_id: &str) -> Option<ConnectionHandle> {
        self.connections.read().await.get(client_id).cloned()
    }

    /// Force-disconnect `client_id`: leave its rooms, remove it, close its transport.
    ///
    /// Returns `true` if a connection was evicted.
    pub async fn evict(&self, client_id: &str) -> Result<bool, HubError> {
        let client_id = client_id.to_string();
        self.request(|respond_to| RegistryMessage::Evict {
            client_id,
            respond_to,
        })
        .await
    }

    /// Get the current registry status.
    pub async fn status(&self) -> Result<RegistryStatus, HubError> {
        self.request(|respond_to| RegistryMessage::GetStatus { respond_to })
            .await
    }

    /// Close all connections and stop the actor.
    ///
    /// Returns the number of connections closed.
    pub async fn shutdown(&self) -> Result<usize, HubError> {
        self.request(|respond_to| RegistryMessage::Shutdown { respond_to })
            .await
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionRegistryActor` implementation.
struct ConnectionRegistryActor {
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Shared with handles for lock-free-of-actor lookups.
    connections: ConnectionMap,
    rooms: Arc<RoomTable>,
    mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
    shutting_down: bool,
}

impl ConnectionRegistryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "hub.actor.registry")]
    async fn run(mut self) {
        info!(target: "hub.registry", "ConnectionRegistryActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "hub.registry",
                        "ConnectionRegistryActor received cancellation signal"
                    );
                    self.close_all().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "hub.registry",
                                "ConnectionRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        let remaining = self.connections.read().await.len();
        info!(
            target: "hub.registry",
            connections_remaining = remaining,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionRegistryActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        debug!(
            target: "hub.registry",
            kind = message.kind(),
            "Processing registry message"
        );

        match message {
            RegistryMessage::Register {
                connection,
                respond_to,
            } => {
                let result = self.handle_register(connection).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::Unregister {
                connection,
                respond_to,
            } => {
                self.handle_unregister(&connection).await;
                let _ = respond_to.send(());
            }

            RegistryMessage::Evict {
                client_id,
                respond_to,
            } => {
                let evicted = self.handle_evict(&client_id).await;
                let _ = respond_to.send(evicted);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let status = self.get_status().await;
                let _ = respond_to.send(status);
            }

            RegistryMessage::Shutdown { respond_to } => {
                let closed = self.close_all().await;
                let _ = respond_to.send(closed);
                self.cancel_token.cancel();
            }
        }
    }

    async fn handle_register(&mut self, connection: ConnectionHandle) -> Result<(), HubError> {
        if self.shutting_down {
            connection.close_logged();
            return Err(HubError::ShuttingDown);
        }

        let client_id = connection.client_id().to_string();
        let (previous, count) = {
            let mut connections = self.connections.write().await;
            let previous = connections.insert(client_id.clone(), Arc::clone(&connection));
            (previous, connections.len())
        };
        metrics::set_connections_active(count);

        info!(
            target: "hub.registry",
            client_id = %client_id,
            connection_id = %connection.connection_id(),
            total_connections = count,
            "Registered client"
        );

        if let Some(previous) = previous.filter(|p| !p.same_as(&connection)) {
            warn!(
                target: "hub.registry",
                client_id = %client_id,
                superseded_connection_id = %previous.connection_id(),
                "Client re-registered, closing superseded connection"
            );
            metrics::record_connection_superseded();
            self.teardown(&previous).await;
        }

        Ok(())
    }

    async fn handle_unregister(&mut self, connection: &ConnectionHandle) {
        let client_id = connection.client_id();
        let (removed, count) = {
            let mut connections = self.connections.write().await;
            let is_current = connections
                .get(client_id)
                .is_some_and(|current| current.same_as(connection));
            if is_current {
                connections.remove(client_id);
            }
            (is_current, connections.len())
        };

        if removed {
            metrics::set_connections_active(count);
            info!(
                target: "hub.registry",
                client_id = %client_id,
                connection_id = %connection.connection_id(),
                total_connections = count,
                "Unregistered client"
            );
        } else {
            debug!(
                target: "hub.registry",
                client_id = %client_id,
                connection_id = %connection.connection_id(),
                "Unregister for connection not in registry"
            );
        }

        connection.close_logged();
    }

    async fn handle_evict(&mut self, client_id: &str) -> bool {
        let (evicted, count) = {
            let mut connections = self.connections.write().await;
            let evicted = connections.remove(client_id);
            (evicted, connections.len())
        };

        let Some(connection) = evicted else {
            debug!(
                target: "hub.registry",
                client_id = %client_id,
                "Evict for unknown client"
            );
            return false;
        };

        metrics::set_connections_active(count);
        metrics::record_eviction();
        info!(
            target: "hub.registry",
            client_id = %client_id,
            connection_id = %connection.connection_id(),
            "Evicted client"
        );

        self.teardown(&connection).await;
        true
    }

    async fn get_status(&self) -> RegistryStatus {
        RegistryStatus {
            connection_count: self.connections.read().await.len(),
            // The message being processed is still counted.
            mailbox_depth: self.mailbox.current_depth().saturating_sub(1),
            messages_processed: self.mailbox.messages_processed(),
            is_shutting_down: self.shutting_down,
        }
    }

    /// Leave all rooms and close the transport.
    ///
    /// If a disconnect already claimed the teardown, its own unregister
    /// closes the transport, so nothing is done here.
    async fn teardown(&self, connection: &ConnectionHandle) {
        if connection.begin_teardown() {
            self.rooms.leave_all(connection).await;
            connection.close_logged();
        }
    }

    /// Tear down every registered connection. Returns how many were closed.
    async fn close_all(&mut self) -> usize {
        self.shutting_down = true;

        let drained: Vec<ConnectionHandle> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };
        metrics::set_connections_active(0);

        for connection in &drained {
            self.teardown(connection).await;
        }

        info!(
            target: "hub.registry",
            closed = drained.len(),
            "Closed all connections"
        );

        drained.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::test_support::{RecordingTransport, TransportProbe};
    use std::time::Duration;

    fn connect(client_id: &str) -> (ConnectionHandle, TransportProbe) {
        let (transport, probe) = RecordingTransport::new();
        (Connection::new(client_id, Box::new(transport)), probe)
    }

    fn registry() -> (ConnectionRegistryHandle, Arc<RoomTable>) {
        let rooms = RoomTable::new(false);
        (
            ConnectionRegistryHandle::new(Arc::clone(&rooms), REGISTRY_CHANNEL_BUFFER),
            rooms,
        )
    }

    #[test]
    fn test_actor_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let (_sender, receiver) = mpsc::channel(1);
        let actor = ConnectionRegistryActor {
            receiver,
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: RoomTable::new(false),
            mailbox: Arc::new(MailboxMonitor::new(ActorType::Registry, "registry")),
            cancel_token: CancellationToken::new(),
            shutting_down: false,
        };
        assert_send(&actor.run());
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let (registry, _) = registry();
        let (alice, _) = connect("alice");

        registry.register(Arc::clone(&alice)).await.unwrap();

        let found = registry.lookup("alice").await.unwrap();
        assert!(found.same_as(&alice));
        assert!(registry.lookup("bob").await.is_none());
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_removes_and_closes() {
        let (registry, _) = registry();
        let (alice, probe) = connect("alice");

        registry.register(Arc::clone(&alice)).await.unwrap();
        registry.unregister(Arc::clone(&alice)).await.unwrap();

        assert!(registry.lookup("alice").await.is_none());
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (registry, _) = registry();
        let (alice, probe) = connect("alice");

        registry.register(Arc::clone(&alice)).await.unwrap();
        registry.unregister(Arc::clone(&alice)).await.unwrap();
        registry.unregister(Arc::clone(&alice)).await.unwrap();

        assert!(registry.lookup("alice").await.is_none());
        assert!(probe.is_closed());
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let (registry, _) = registry();
        let (ghost, _) = connect("ghost");

        registry.unregister(ghost).await.unwrap();
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_reregister_replaces_and_closes_previous() {
        let (registry, rooms) = registry();
        let (old, old_probe) = connect("alice");
        let (new, new_probe) = connect("alice");

        registry.register(Arc::clone(&old)).await.unwrap();
        rooms.join(&old, "lobby").await;

        registry.register(Arc::clone(&new)).await.unwrap();

        let found = registry.lookup("alice").await.unwrap();
        assert!(found.same_as(&new));
        assert!(old_probe.is_closed());
        assert!(!new_probe.is_closed());

        // Superseded connection left its rooms.
        assert!(rooms.members("lobby").await.is_empty());
        assert!(old.rooms().await.is_empty());
        assert!(old.is_torn_down());
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_entry() {
        let (registry, _) = registry();
        let (old, _) = connect("alice");
        let (new, new_probe) = connect("alice");

        registry.register(Arc::clone(&old)).await.unwrap();
        registry.register(Arc::clone(&new)).await.unwrap();

        // Late disconnect notification for the superseded connection.
        registry.unregister(Arc::clone(&old)).await.unwrap();

        let found = registry.lookup("alice").await.unwrap();
        assert!(found.same_as(&new));
        assert!(!new_probe.is_closed());
    }

    #[tokio::test]
    async fn test_evict() {
        let (registry, rooms) = registry();
        let (alice, probe) = connect("alice");

        registry.register(Arc::clone(&alice)).await.unwrap();
        rooms.join(&alice, "lobby").await;

        assert!(registry.evict("alice").await.unwrap());

        assert!(registry.lookup("alice").await.is_none());
        assert!(probe.is_closed());
        assert!(rooms.members("lobby").await.is_empty());

        assert!(!registry.evict("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_status() {
        let (registry, _) = registry();
        let (alice, _) = connect("alice");
        let (bob, _) = connect("bob");

        registry.register(alice).await.unwrap();
        registry.register(bob).await.unwrap();

        let status = registry.status().await.unwrap();
        assert_eq!(status.connection_count, 2);
        assert!(!status.is_shutting_down);
        assert!(status.messages_processed >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (registry, _) = registry();
        let (alice, alice_probe) = connect("alice");
        let (bob, bob_probe) = connect("bob");

        registry.register(alice).await.unwrap();
        registry.register(bob).await.unwrap();

        assert_eq!(registry.shutdown().await.unwrap(), 2);
        assert!(alice_probe.is_closed());
        assert!(bob_probe.is_closed());
        assert_eq!(registry.connection_count().await, 0);

        // Give the actor a moment to observe its own cancellation.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.is_cancelled());

        let (carol, carol_probe) = connect("carol");
        let result = registry.register(carol).await;
        assert!(matches!(result, Err(HubError::ShuttingDown)));
        assert!(registry.lookup("carol").await.is_none());
        // Either the actor refused it or the channel was already closed;
        // a refused connection is closed, a never-delivered one is untouched.
        let _ = carol_probe.is_closed();
    }

    #[tokio::test]
    async fn test_cancel_closes_connections() {
        let (registry, _) = registry();
        let (alice, probe) = connect("alice");

        registry.register(alice).await.unwrap();
        registry.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(probe.is_closed());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_registrations() {
        let (registry, _) = registry();
        let mut tasks = Vec::new();

        for i in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, _) = connect(&format!("client-{i}"));
                registry.register(conn).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.connection_count().await, 50);
        for i in 0..50 {
            assert!(registry.lookup(&format!("client-{i}")).await.is_some());
        }
    }
}
