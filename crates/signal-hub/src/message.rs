//! Signalling wire message.
//!
//! Messages are JSON objects. Only `messageType` is required; the content
//! payload is kept as raw JSON and never interpreted by the hub.

use crate::errors::HubError;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// Message type tag.
///
/// Unrecognized tags are kept verbatim in [`MessageType::Other`] so they
/// parse successfully and re-serialize unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    Broadcaster,
    Connect,
    Watcher,
    Offer,
    Answer,
    Candidate,
    Disconnect,
    DisconnectPeer,
    JoinRoom,
    LeaveRoom,
    Broadcast,
    Ping,
    Pong,
    Error,
    Ack,
    /// Any tag outside the known set.
    Other(String),
}

impl MessageType {
    /// Returns the wire representation of the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Broadcaster => "broadcaster",
            MessageType::Connect => "connect",
            MessageType::Watcher => "watcher",
            MessageType::Offer => "offer",
            MessageType::Answer => "answer",
            MessageType::Candidate => "candidate",
            MessageType::Disconnect => "disconnect",
            MessageType::DisconnectPeer => "disconnectPeer",
            MessageType::JoinRoom => "joinRoom",
            MessageType::LeaveRoom => "leaveRoom",
            MessageType::Broadcast => "broadcast",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Error => "error",
            MessageType::Ack => "ack",
            MessageType::Other(tag) => tag,
        }
    }

    /// Bounded label for metrics; unknown tags collapse to `other`.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            MessageType::Broadcaster => "broadcaster",
            MessageType::Connect => "connect",
            MessageType::Watcher => "watcher",
            MessageType::Offer => "offer",
            MessageType::Answer => "answer",
            MessageType::Candidate => "candidate",
            MessageType::Disconnect => "disconnect",
            MessageType::DisconnectPeer => "disconnect_peer",
            MessageType::JoinRoom => "join_room",
            MessageType::LeaveRoom => "leave_room",
            MessageType::Broadcast => "broadcast",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Error => "error",
            MessageType::Ack => "ack",
            MessageType::Other(_) => "other",
        }
    }

    /// Whether this is a WebRTC negotiation message forwarded peer-to-peer.
    #[must_use]
    pub const fn is_negotiation(&self) -> bool {
        matches!(
            self,
            MessageType::Offer | MessageType::Answer | MessageType::Candidate
        )
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "broadcaster" => MessageType::Broadcaster,
            "connect" => MessageType::Connect,
            "watcher" => MessageType::Watcher,
            "offer" => MessageType::Offer,
            "answer" => MessageType::Answer,
            "candidate" => MessageType::Candidate,
            "disconnect" => MessageType::Disconnect,
            "disconnectPeer" => MessageType::DisconnectPeer,
            "joinRoom" => MessageType::JoinRoom,
            "leaveRoom" => MessageType::LeaveRoom,
            "broadcast" => MessageType::Broadcast,
            "ping" => MessageType::Ping,
            "pong" => MessageType::Pong,
            "error" => MessageType::Error,
            "ack" => MessageType::Ack,
            _ => MessageType::Other(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signalling message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Sender identifier as claimed by the client.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub from: String,

    /// Target client for peer-forwarded messages.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub to: String,

    /// Room for join/leave/broadcast messages.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub room_id: String,

    pub message_type: MessageType,

    /// Opaque payload, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_content: Option<Box<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Explicit `null` reads the same as an absent field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    /// Create a message with only a type and sender set.
    #[must_use]
    pub fn new(message_type: MessageType, from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: String::new(),
            room_id: String::new(),
            message_type,
            message_content: None,
            timestamp: None,
        }
    }

    /// Build a server-originated `error` message carrying a client-safe reason.
    #[must_use]
    pub fn error(reason: &str) -> Self {
        let content = serde_json::to_string(reason)
            .ok()
            .and_then(|json| RawValue::from_string(json).ok());

        Self {
            message_content: content,
            timestamp: Some(Utc::now()),
            ..Self::new(MessageType::Error, "")
        }
    }

    /// Parse a message from raw frame bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, HubError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Encode the message as a JSON frame.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
