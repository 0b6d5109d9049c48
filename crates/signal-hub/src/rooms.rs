//! `RoomTable` - named groups of connections that receive each other's broadcasts.
//!
//! Locking:
//! - The top-level room map has its own `RwLock`, held only long enough to
//!   create-or-fetch an `Arc<Room>`.
//! - Each room guards its membership with its own `RwLock`, so broadcasts
//!   into different rooms never contend.
//!
//! Lock order is always room map, then room. Join never holds both.

use crate::connection::{Connection, ConnectionHandle};
use crate::observability::metrics;

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct RoomState {
    members: HashMap<String, ConnectionHandle>,
    /// Set when the room has been pruned from the table.
    retired: bool,
}

impl RoomState {
    /// Whether `conn` itself, not just its client ID, is a member.
    fn contains(&self, conn: &Connection) -> bool {
        self.members
            .get(conn.client_id())
            .is_some_and(|member| member.same_as(conn))
    }
}

#[derive(Debug, Default)]
struct Room {
    state: RwLock<RoomState>,
}

impl Room {
    async fn member_ids(&self) -> Vec<String> {
        self.state.read().await.members.keys().cloned().collect()
    }
}

/// All rooms known to the hub.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    /// Remove rooms from the table once their last member leaves.
    prune_empty: bool,
}

impl RoomTable {
    /// Create an empty room table.
    #[must_use]
    pub fn new(prune_empty: bool) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            prune_empty,
        })
    }

    async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        if let Some(room) = self.get(room_id).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        let room = Arc::clone(
            rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Room::default())),
        );
        metrics::set_rooms_active(rooms.len());
        room
    }

    /// Add `conn` to `room_id`, creating the room on first join.
    ///
    /// An empty room ID is a no-op.
    pub async fn join(&self, conn: &ConnectionHandle, room_id: &str) {
        if room_id.is_empty() {
            warn!(
                target: "hub.rooms",
                client_id = %conn.client_id(),
                "Join with empty room ID ignored"
            );
            metrics::record_routing_noop("empty_room_id");
            return;
        }

        if conn.is_torn_down() {
            debug!(
                target: "hub.rooms",
                client_id = %conn.client_id(),
                room_id = %room_id,
                "Join from torn down connection ignored"
            );
            return;
        }

        // A pruned room can be retired between fetch and lock; fetch again.
        loop {
            let room = self.get_or_create(room_id).await;
            let mut state = room.state.write().await;
            if state.retired {
                continue;
            }
            state
                .members
                .insert(conn.client_id().to_string(), Arc::clone(conn));
            break;
        }
        conn.mark_joined(room_id).await;

        // Teardown may have drained the connection's rooms while we were
        // inserting; undo so no member outlives its connection.
        if conn.is_torn_down() {
            self.leave(conn, room_id).await;
            return;
        }

        info!(
            target: "hub.rooms",
            client_id = %conn.client_id(),
            room_id = %room_id,
            "Joined room"
        );
    }

    /// Remove `conn` from `room_id`.
    ///
    /// Empty or unknown room IDs are a no-op, as is leaving a room the
    /// connection never joined.
    pub async fn leave(&self, conn: &Connection, room_id: &str) {
        if room_id.is_empty() {
            metrics::record_routing_noop("empty_room_id");
            return;
        }

        let Some(room) = self.get(room_id).await else {
            conn.mark_left(room_id).await;
            debug!(
                target: "hub.rooms",
                client_id = %conn.client_id(),
                room_id = %room_id,
                "Leave for unknown room ignored"
            );
            metrics::record_routing_noop("unknown_room");
            return;
        };

        let now_empty = {
            let mut state = room.state.write().await;
            // Only remove the entry if it is this connection, not a newer
            // connection registered under the same client ID.
            if state.contains(conn) {
                state.members.remove(conn.client_id());
            }
            state.members.is_empty()
        };
        conn.mark_left(room_id).await;

        info!(
            target: "hub.rooms",
            client_id = %conn.client_id(),
            room_id = %room_id,
            "Left room"
        );

        if now_empty && self.prune_empty {
            self.prune(room_id).await;
        }
    }

    /// Leave every room `conn` believes it is in.
    pub async fn leave_all(&self, conn: &Connection) {
        for room_id in conn.rooms().await {
            self.leave(conn, &room_id).await;
        }
    }

    /// Remove `room_id` from the table if it is still empty.
    async fn prune(&self, room_id: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(room_id).cloned() else {
            return;
        };

        let mut state = room.state.write().await;
        if state.members.is_empty() {
            state.retired = true;
            rooms.remove(room_id);
            metrics::set_rooms_active(rooms.len());
            debug!(target: "hub.rooms", room_id = %room_id, "Pruned empty room");
        }
    }

    /// Send `frame` to every member of `room_id` except `sender`.
    ///
    /// No-op unless the room exists and `sender` is currently a member.
    /// Delivery is attempted to every member in the snapshot taken under the
    /// room lock; one failed send never stops the others.
    ///
    /// Returns the number of members the frame was delivered to.
    pub async fn broadcast(&self, sender: &Connection, room_id: &str, frame: &Bytes) -> usize {
        let Some(room) = self.get(room_id).await else {
            debug!(
                target: "hub.rooms",
                client_id = %sender.client_id(),
                room_id = %room_id,
                "Broadcast to unknown room ignored"
            );
            metrics::record_routing_noop("unknown_room");
            return 0;
        };

        let recipients: Vec<ConnectionHandle> = {
            let state = room.state.read().await;
            if !state.contains(sender) {
                warn!(
                    target: "hub.rooms",
                    client_id = %sender.client_id(),
                    room_id = %room_id,
                    "Broadcast from non-member ignored"
                );
                metrics::record_routing_noop("not_a_member");
                return 0;
            }

            state
                .members
                .values()
                .filter(|member| !member.same_as(sender))
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for member in &recipients {
            match member.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        target: "hub.rooms",
                        room_id = %room_id,
                        client_id = %member.client_id(),
                        error = %e,
                        "Broadcast delivery failed"
                    );
                    metrics::record_delivery_failure(e.as_str());
                }
            }
        }

        debug!(
            target: "hub.rooms",
            client_id = %sender.client_id(),
            room_id = %room_id,
            recipients = recipients.len(),
            delivered = delivered,
            "Broadcast complete"
        );

        delivered
    }

    /// Number of rooms in the table.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Client IDs of the members of `room_id` (empty if unknown).
    pub async fn members(&self, room_id: &str) -> Vec<String> {
        match self.get(room_id).await {
            Some(room) => room.member_ids().await,
            None => Vec::new(),
        }
    }
}
