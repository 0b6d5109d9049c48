//! Signal Hub error types.
//!
//! Only malformed-input errors cross the router boundary. Routing no-ops and
//! per-target delivery failures are logged and counted, never returned.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Signal Hub error type.
///
/// Maps to bounded `error_code()` labels:
/// - `MalformedMessage`: `malformed_message`
/// - `MissingClientId`: `missing_client_id`
/// - `Transport`: `transport`
/// - `ShuttingDown`: `shutting_down`
/// - `Internal`: `internal`
#[derive(Debug, Error)]
pub enum HubError {
    /// Inbound bytes could not be parsed into a signalling message.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Connection attempted without a client identifier.
    #[error("Missing client identifier")]
    MissingClientId,

    /// Sending to or closing a transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The registry is shutting down and no longer accepts requests.
    #[error("Hub is shutting down")]
    ShuttingDown,

    /// Internal error (actor channel failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The underlying connection is already closed.
    #[error("connection closed")]
    Closed,

    /// The outbound queue is full (slow consumer).
    #[error("outbound queue full")]
    QueueFull,

    /// The outbound message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl TransportError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportError::Closed => "closed",
            TransportError::QueueFull => "queue_full",
            TransportError::Encode(_) => "encode",
        }
    }
}

impl HubError {
    /// Returns a bounded error code for logs, metrics and client replies.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            HubError::MalformedMessage(_) => "malformed_message",
            HubError::MissingClientId => "missing_client_id",
            HubError::Transport(_) => "transport",
            HubError::ShuttingDown => "shutting_down",
            HubError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            HubError::MalformedMessage(_) => "Invalid message format".to_string(),
            HubError::MissingClientId => "client_id is required".to_string(),
            HubError::ShuttingDown => "Server is shutting down, please reconnect".to_string(),
            HubError::Transport(_) | HubError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::MalformedMessage(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            HubError::MalformedMessage("eof".to_string()).error_code(),
            "malformed_message"
        );
        assert_eq!(HubError::MissingClientId.error_code(), "missing_client_id");
        assert_eq!(
            HubError::Transport(TransportError::Closed).error_code(),
            "transport"
        );
        assert_eq!(HubError::ShuttingDown.error_code(), "shutting_down");
        assert_eq!(
            HubError::Internal("channel".to_string()).error_code(),
            "internal"
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = HubError::MalformedMessage("expected value at line 1 column 7".to_string());
        assert!(!err.client_message().contains("line 1"));
        assert_eq!(err.client_message(), "Invalid message format");

        let err = HubError::Internal("registry actor dropped responder".to_string());
        assert!(!err.client_message().contains("registry"));
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_serde_error_converts_to_malformed() {
        let parse_err = serde_json::from_slice::<serde_json::Value>(b"{not json").unwrap_err();
        let err: HubError = parse_err.into();
        assert!(matches!(err, HubError::MalformedMessage(_)));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", HubError::Transport(TransportError::QueueFull)),
            "Transport error: outbound queue full"
        );
        assert_eq!(TransportError::QueueFull.as_str(), "queue_full");
        assert_eq!(
            format!("{}", TransportError::Encode("bad utf8".to_string())),
            "encode failed: bad utf8"
        );
    }
}
