//! Error taxonomy for the control channel

use thiserror::Error;

/// Initiation-time failures. Surfaced to callers as a `false` return from
/// `connect`, never fatal.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The endpoint could not be turned into a WebSocket URL
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    /// The client refused to start a session
    #[error("failed to initiate connection: {0}")]
    Initiation(String),
    /// An operation needed a live session and there was none
    #[error("not connected")]
    NotConnected,
}

impl ConnectionError {
    /// Whether retrying with the same credentials can ever succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, ConnectionError::InvalidEndpoint { .. })
    }
}

/// Failures inside an established (or establishing) session
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("malformed message: {0}")]
    Decode(String),
    #[error("request failed with code {code}: {comment}")]
    RequestFailed { code: u16, comment: String },
    #[error("request timed out")]
    Timeout,
    #[error("session closed")]
    SessionClosed,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProtocolError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ProtocolError::Transport(err.to_string())
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Disconnect requested locally
    Requested,
    /// The remote sent a close frame
    Closed { code: u16, reason: String },
    /// Network or protocol failure
    Failed(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::Closed { code, reason } if reason.is_empty() => {
                write!(f, "closed by remote (code {})", code)
            }
            DisconnectReason::Closed { code, reason } => {
                write!(f, "closed by remote (code {}): {}", code, reason)
            }
            DisconnectReason::Failed(msg) => write!(f, "connection failed: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_endpoint_is_permanent() {
        let invalid = ConnectionError::InvalidEndpoint {
            endpoint: "nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert!(invalid.is_permanent());
        assert!(!ConnectionError::Initiation("boom".to_string()).is_permanent());
        assert!(!ConnectionError::NotConnected.is_permanent());
    }

    #[test]
    fn test_disconnect_reason_display() {
        let closed = DisconnectReason::Closed {
            code: 4009,
            reason: "Authentication failed.".to_string(),
        };
        assert_eq!(
            closed.to_string(),
            "closed by remote (code 4009): Authentication failed."
        );

        let bare = DisconnectReason::Closed { code: 1000, reason: String::new() };
        assert_eq!(bare.to_string(), "closed by remote (code 1000)");
    }
}
