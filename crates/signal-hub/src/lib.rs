//! Signal Hub Library
//!
//! A WebRTC signalling hub. Clients connect over a WebSocket with a
//! self-chosen client ID and exchange small JSON messages:
//!
//! - Negotiation messages (`offer`, `answer`, `candidate`) are relayed to the
//!   client named in `to`
//! - Clients join and leave named rooms and broadcast to the other members
//! - The hub never interprets message content
//!
//! # Architecture
//!
//! ```text
//! WebSocket (transport::ws)
//! └── MessageRouter
//!     ├── ConnectionRegistryActor (client ID -> Connection, one per hub)
//!     └── RoomTable (room ID -> members, one lock per room)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Connection registry actor and mailbox monitoring
//! - [`config`] - Service configuration from environment
//! - [`connection`] - A live transport bound to a client ID
//! - [`errors`] - Error types with bounded error codes
//! - [`message`] - Wire message format
//! - [`observability`] - Health probes and Prometheus metrics
//! - [`rooms`] - Room membership and broadcast
//! - [`router`] - Dispatch of inbound messages
//! - [`routes`] - HTTP routes (WebSocket, status, admin)
//! - [`transport`] - Transport trait and the WebSocket adapter

pub mod actors;
pub mod config;
pub mod connection;
pub mod errors;
pub mod message;
pub mod observability;
pub mod rooms;
pub mod router;
pub mod routes;
pub mod transport;

#[cfg(test)]
mod test_support;
