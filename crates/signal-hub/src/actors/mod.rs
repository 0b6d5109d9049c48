//! Actors for the Signal Hub.
//!
//! ```text
//! ConnectionRegistryActor (singleton)
//! └── owns the client ID -> Connection map
//!     (lookups read the map directly, mutations go through the mailbox)
//!
//! writer task (one per WebSocket connection, see transport::ws)
//! └── drains the connection's bounded outbound queue into the socket
//! ```
//!
//! # Modules
//!
//! - [`registry`] - `ConnectionRegistryActor` and its handle
//! - [`messages`] - Message types for the registry mailbox
//! - [`metrics`] - Mailbox monitoring

pub mod messages;
pub mod metrics;
pub mod registry;

pub use messages::{RegistryMessage, RegistryStatus};
pub use metrics::{ActorType, MailboxLevel, MailboxMonitor};
pub use registry::{ConnectionRegistryHandle, REGISTRY_CHANNEL_BUFFER};
