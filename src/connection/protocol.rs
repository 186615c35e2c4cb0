//! obs-websocket v5 wire messages
//!
//! Only the subset needed to follow the stream output state: the
//! Hello/Identify/Identified handshake, output events and `GetStreamStatus`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::error::ProtocolError;

/// RPC version this client speaks
pub const RPC_VERSION: u32 = 1;
/// `EventSubscription::Outputs`
pub const EVENT_SUBSCRIPTION_OUTPUTS: u32 = 1 << 6;

pub const OP_HELLO: u8 = 0;
pub const OP_IDENTIFY: u8 = 1;
pub const OP_IDENTIFIED: u8 = 2;
pub const OP_EVENT: u8 = 5;
pub const OP_REQUEST: u8 = 6;
pub const OP_REQUEST_RESPONSE: u8 = 7;

/// Close code sent by obs-websocket when the password is wrong
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Serialize)]
struct OutgoingEnvelope<T: Serialize> {
    op: u8,
    d: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Value,
}

impl RequestResponse {
    /// Turn a failed status into an error, otherwise hand back the payload
    pub fn into_data(self) -> Result<Value, ProtocolError> {
        if self.request_status.result {
            Ok(self.response_data)
        } else {
            Err(ProtocolError::RequestFailed {
                code: self.request_status.code,
                comment: self.request_status.comment.unwrap_or_default(),
            })
        }
    }
}

/// Output state payload shared by `StreamStateChanged` and `GetStreamStatus`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputActive {
    pub output_active: bool,
    #[serde(default)]
    pub output_state: Option<String>,
}

/// A decoded message from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    /// An opcode this client does not act on
    Other(u8),
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let message = match envelope.op {
            OP_HELLO => ServerMessage::Hello(serde_json::from_value(envelope.d)?),
            OP_IDENTIFIED => ServerMessage::Identified(serde_json::from_value(envelope.d)?),
            OP_EVENT => ServerMessage::Event(serde_json::from_value(envelope.d)?),
            OP_REQUEST_RESPONSE => {
                ServerMessage::RequestResponse(serde_json::from_value(envelope.d)?)
            }
            other => ServerMessage::Other(other),
        };
        Ok(message)
    }
}

impl Event {
    /// `Some(active)` when this is a `StreamStateChanged` event
    pub fn stream_state(&self) -> Option<bool> {
        if self.event_type != "StreamStateChanged" {
            return None;
        }
        serde_json::from_value::<OutputActive>(self.event_data.clone())
            .ok()
            .map(|data| data.output_active)
    }
}

/// Compute the `authentication` string for an Identify message
pub fn auth_response(password: &str, challenge: &AuthChallenge) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{}{}", password, challenge.salt)));
    BASE64.encode(Sha256::digest(format!("{}{}", secret, challenge.challenge)))
}

/// Encode the Identify message answering `hello`
pub fn identify(hello: &Hello, password: &str) -> Result<String, ProtocolError> {
    let mut d = json!({
        "rpcVersion": RPC_VERSION,
        "eventSubscriptions": EVENT_SUBSCRIPTION_OUTPUTS,
    });
    if let Some(challenge) = &hello.authentication {
        d["authentication"] = Value::String(auth_response(password, challenge));
    }
    Ok(serde_json::to_string(&OutgoingEnvelope { op: OP_IDENTIFY, d })?)
}

/// Encode a request without request data
pub fn request(request_type: &str, request_id: &str) -> Result<String, ProtocolError> {
    let d = json!({
        "requestType": request_type,
        "requestId": request_id,
    });
    Ok(serde_json::to_string(&OutgoingEnvelope { op: OP_REQUEST, d })?)
}
