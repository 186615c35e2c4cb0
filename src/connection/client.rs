//! Control channel client abstraction
//!
//! The resilience manager only talks to the remote application through
//! [`ControlChannelClient`]. Outcomes of a connection attempt are delivered as
//! [`ClientEvent`]s on a channel handed to the client at construction time, so
//! the transport's own tasks never run subscriber code.

use async_trait::async_trait;
use std::fmt;
use url::Url;

use super::error::{ConnectionError, DisconnectReason, ProtocolError};

/// Identifies one connection attempt. Events from an older session are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callbacks raised by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake completed
    Connected { session: SessionId },
    /// Session ended (also raised when a handshake never completes)
    Disconnected {
        session: SessionId,
        reason: DisconnectReason,
    },
    /// The remote reported an output state transition
    StreamStateChanged { session: SessionId, active: bool },
}

impl ClientEvent {
    pub fn session(&self) -> SessionId {
        match self {
            ClientEvent::Connected { session }
            | ClientEvent::Disconnected { session, .. }
            | ClientEvent::StreamStateChanged { session, .. } => *session,
        }
    }
}

/// Reply to a stream status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStatus {
    pub active: bool,
}

/// A validated WebSocket endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Build an endpoint from the configured base URL and port (`"{url}:{port}"`)
    pub fn new(url: &str, port: u16) -> Result<Self, ConnectionError> {
        let raw = format!("{}:{}", url.trim().trim_end_matches('/'), port);
        let invalid = |reason: String| ConnectionError::InvalidEndpoint {
            endpoint: raw.clone(),
            reason,
        };

        let parsed = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        if parsed.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self { url: parsed })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Client side of the control channel
#[async_trait]
pub trait ControlChannelClient: Send + Sync + 'static {
    /// Start a session. Returns as soon as the attempt is initiated; the
    /// outcome arrives later as [`ClientEvent::Connected`] or
    /// [`ClientEvent::Disconnected`].
    fn connect(&self, endpoint: &Endpoint, secret: &str) -> Result<SessionId, ConnectionError>;

    /// End the current session, if any. Does not wait for the socket to close.
    fn disconnect(&self);

    /// Ask the remote whether its stream output is active
    async fn stream_status(&self) -> Result<StreamStatus, ProtocolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_url_and_port() {
        let endpoint = Endpoint::new("ws://localhost", 4455).unwrap();
        assert_eq!(endpoint.url().host_str(), Some("localhost"));
        assert_eq!(endpoint.url().port(), Some(4455));
        assert_eq!(endpoint.url().scheme(), "ws");
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let endpoint = Endpoint::new("ws://192.168.1.20/", 4456).unwrap();
        assert_eq!(endpoint.url().host_str(), Some("192.168.1.20"));
        assert_eq!(endpoint.url().port(), Some(4456));
    }

    #[test]
    fn test_endpoint_rejects_missing_scheme() {
        let err = Endpoint::new("localhost", 4455).unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_endpoint_rejects_http() {
        assert!(Endpoint::new("http://localhost", 4455).is_err());
    }

    #[test]
    fn test_endpoint_rejects_port_already_present() {
        assert!(Endpoint::new("ws://localhost:4455", 4455).is_err());
    }

    #[test]
    fn test_event_session_accessor() {
        let event = ClientEvent::StreamStateChanged {
            session: SessionId(7),
            active: true,
        };
        assert_eq!(event.session(), SessionId(7));
    }
}
