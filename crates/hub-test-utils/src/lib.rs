//! # Hub Test Utilities
//!
//! Shared test utilities for the Signal Hub.
//!
//! This crate provides a recording transport and message fixtures so router
//! and room behavior can be tested without opening sockets.
//!
//! ## Modules
//!
//! - `mock_transport` - Transport that records outbound frames
//! - `fixtures` - Message builders and a pre-wired hub
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let hub = TestHub::new();
//!     let (alice, alice_probe) = hub.connect("alice").await;
//!     let (bob, bob_probe) = hub.connect("bob").await;
//!
//!     hub.send(&alice, MessageBuilder::join_room("lobby")).await;
//!     hub.send(&bob, MessageBuilder::join_room("lobby")).await;
//!     hub.send(&alice, MessageBuilder::broadcast("lobby").content(r#"{"hello":1}"#)).await;
//!
//!     assert_eq!(bob_probe.messages().len(), 1);
//!     assert!(alice_probe.messages().is_empty());
//! }
//! ```

pub mod fixtures;
pub mod mock_transport;

pub use fixtures::{MessageBuilder, TestHub};
pub use mock_transport::{MockTransport, TransportProbe};
