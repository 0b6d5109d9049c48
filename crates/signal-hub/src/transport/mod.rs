//! Transport abstraction.
//!
//! The hub never touches sockets directly. A [`Transport`] is the outbound
//! half of one live bidirectional connection: it accepts encoded frames and
//! can be closed. Inbound frames and close notifications are delivered by
//! the transport's owner calling into the [`MessageRouter`](crate::router::MessageRouter).
//!
//! # Modules
//!
//! - [`ws`] - axum WebSocket adapter

pub mod ws;

use crate::errors::TransportError;

use bytes::Bytes;
use std::fmt::Debug;

/// Outbound half of a bidirectional message transport.
///
/// Both methods must be non-blocking: implementations enqueue and return.
/// A full or closed queue is reported as an error for that single call.
pub trait Transport: Send + Sync + Debug {
    /// Enqueue a frame for delivery to the remote peer.
    fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Closing an already-closed transport returns
    /// [`TransportError::Closed`].
    fn close(&self) -> Result<(), TransportError>;
}

pub use ws::{ws_router, WsTransport};
