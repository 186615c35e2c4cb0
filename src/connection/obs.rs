//! obs-websocket v5 client
//!
//! Each `connect` spawns one session task that owns the socket. The task
//! performs the Hello/Identify handshake, forwards output events and serves
//! requests, and raises exactly one `Disconnected` event when it ends.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::client::{ClientEvent, ControlChannelClient, Endpoint, SessionId, StreamStatus};
use super::error::{ConnectionError, DisconnectReason, ProtocolError};
use super::protocol::{self, OutputActive, ServerMessage, CLOSE_AUTHENTICATION_FAILED};

/// How long a request may wait for its response
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<Value, ProtocolError>>;

enum SessionCommand {
    Request { request_type: &'static str, reply: Reply },
    Close,
}

struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

/// Control channel client for OBS Studio
pub struct ObsClient {
    events: mpsc::UnboundedSender<ClientEvent>,
    next_session: AtomicU64,
    current: Mutex<Option<SessionHandle>>,
    request_timeout: Duration,
}

impl ObsClient {
    /// Create a client that reports session events on `events`
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            events,
            next_session: AtomicU64::new(0),
            current: Mutex::new(None),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    async fn request(&self, request_type: &'static str) -> Result<Value, ProtocolError> {
        let commands = self
            .current
            .lock()
            .as_ref()
            .map(|session| session.commands.clone())
            .ok_or(ConnectionError::NotConnected)?;

        let (reply, response) = oneshot::channel();
        commands
            .send(SessionCommand::Request { request_type, reply })
            .map_err(|_| ProtocolError::SessionClosed)?;

        tokio::time::timeout(self.request_timeout, response)
            .await
            .map_err(|_| ProtocolError::Timeout)?
            .map_err(|_| ProtocolError::SessionClosed)?
    }
}

#[async_trait]
impl ControlChannelClient for ObsClient {
    fn connect(&self, endpoint: &Endpoint, secret: &str) -> Result<SessionId, ConnectionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConnectionError::Initiation(e.to_string()))?;

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let previous = self.current.lock().replace(SessionHandle { id, commands });
        if let Some(previous) = previous {
            debug!("Session {} superseded by {}", previous.id, id);
            let _ = previous.commands.send(SessionCommand::Close);
        }

        debug!("Starting session {} to {}", id, endpoint);
        runtime.spawn(run_session(
            id,
            endpoint.url().clone(),
            secret.to_string(),
            command_rx,
            self.events.clone(),
        ));

        Ok(id)
    }

    fn disconnect(&self) {
        if let Some(session) = self.current.lock().take() {
            debug!("Closing session {}", session.id);
            let _ = session.commands.send(SessionCommand::Close);
        }
    }

    async fn stream_status(&self) -> Result<StreamStatus, ProtocolError> {
        let data = self.request("GetStreamStatus").await?;
        let status: OutputActive = serde_json::from_value(data)?;
        Ok(StreamStatus { active: status.output_active })
    }
}

async fn run_session(
    id: SessionId,
    url: Url,
    password: String,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let reason = match drive_session(id, &url, &password, &mut commands, &events).await {
        Ok(reason) => reason,
        Err(e) => DisconnectReason::Failed(e.to_string()),
    };

    if let DisconnectReason::Closed { code: CLOSE_AUTHENTICATION_FAILED, .. } = reason {
        warn!("OBS rejected the password for session {}", id);
    }
    debug!("Session {} ended: {}", id, reason);
    let _ = events.send(ClientEvent::Disconnected { session: id, reason });
}

async fn drive_session(
    id: SessionId,
    url: &Url,
    password: &str,
    commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    events: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<DisconnectReason, ProtocolError> {
    let handshake = tokio::select! {
        result = open_and_identify(url, password) => result?,
        () = wait_for_close(commands) => return Ok(DisconnectReason::Requested),
    };
    let mut socket = match handshake {
        Handshake::Ready(socket) => socket,
        Handshake::Closed(reason) => return Ok(reason),
    };

    info!("Connected to OBS WebSocket at {}", url);
    let _ = events.send(ClientEvent::Connected { session: id });

    let mut pending: HashMap<String, Reply> = HashMap::new();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(SessionCommand::Close) => {
                    let _ = socket.close(None).await;
                    return Ok(DisconnectReason::Requested);
                }
                Some(SessionCommand::Request { request_type, reply }) => {
                    let request_id = Uuid::new_v4().to_string();
                    let text = protocol::request(request_type, &request_id)?;
                    socket.send(Message::Text(text)).await?;
                    pending.insert(request_id, reply);
                }
            },
            incoming = socket.next() => match incoming {
                None => return Ok(DisconnectReason::Failed("connection reset".to_string())),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Close(frame))) => return Ok(close_reason(frame)),
                Some(Ok(Message::Text(text))) => match ServerMessage::decode(&text) {
                    Ok(ServerMessage::Event(event)) => {
                        if let Some(active) = event.stream_state() {
                            debug!("Session {} stream output active: {}", id, active);
                            let _ = events.send(ClientEvent::StreamStateChanged { session: id, active });
                        }
                    }
                    Ok(ServerMessage::RequestResponse(response)) => {
                        match pending.remove(&response.request_id) {
                            Some(reply) => {
                                let _ = reply.send(response.into_data());
                            }
                            None => debug!("Unsolicited response {}", response.request_id),
                        }
                    }
                    Ok(other) => debug!("Ignoring message {:?}", other),
                    Err(e) => warn!("Ignoring malformed message from OBS: {}", e),
                },
                Some(Ok(_)) => {}
            },
        }
    }
}

enum Handshake {
    Ready(Socket),
    Closed(DisconnectReason),
}

async fn open_and_identify(url: &Url, password: &str) -> Result<Handshake, ProtocolError> {
    let (mut socket, _) = connect_async(url.as_str()).await?;

    let hello = loop {
        match next_message(&mut socket).await? {
            Incoming::Message(ServerMessage::Hello(hello)) => break hello,
            Incoming::Message(other) => debug!("Unexpected message before Hello: {:?}", other),
            Incoming::Closed(reason) => return Ok(Handshake::Closed(reason)),
        }
    };
    debug!(
        "OBS WebSocket {} (rpc {}), authentication {}",
        hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
        hello.rpc_version,
        if hello.authentication.is_some() { "required" } else { "disabled" }
    );

    socket.send(Message::Text(protocol::identify(&hello, password)?)).await?;

    loop {
        match next_message(&mut socket).await? {
            Incoming::Message(ServerMessage::Identified(identified)) => {
                debug!("Identified with rpc version {}", identified.negotiated_rpc_version);
                return Ok(Handshake::Ready(socket));
            }
            Incoming::Message(other) => debug!("Unexpected message before Identified: {:?}", other),
            Incoming::Closed(reason) => return Ok(Handshake::Closed(reason)),
        }
    }
}

enum Incoming {
    Message(ServerMessage),
    Closed(DisconnectReason),
}

async fn next_message(socket: &mut Socket) -> Result<Incoming, ProtocolError> {
    loop {
        match socket.next().await {
            None => return Err(ProtocolError::Handshake("connection closed".to_string())),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Text(text))) => return ServerMessage::decode(&text).map(Incoming::Message),
            Some(Ok(Message::Close(frame))) => return Ok(Incoming::Closed(close_reason(frame))),
            Some(Ok(_)) => {}
        }
    }
}

/// Resolves once a close is requested; requests made before the handshake
/// completes are answered with `NotConnected`.
async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<SessionCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            SessionCommand::Close => return,
            SessionCommand::Request { reply, .. } => {
                let _ = reply.send(Err(ConnectionError::NotConnected.into()));
            }
        }
    }
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> DisconnectReason {
    match frame {
        Some(frame) => DisconnectReason::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.to_string(),
        },
        None => DisconnectReason::Closed { code: 1005, reason: String::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    const WAIT: Duration = Duration::from_secs(5);

    async fn recv_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    async fn read_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            match ws.next().await.expect("client went away").expect("read failed") {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
        ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    /// Minimal obs-websocket: authenticates, answers GetStreamStatus with
    /// `streaming`, then announces the stream stopping and waits for close.
    async fn spawn_fake_obs(password: &'static str, streaming: bool) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let challenge = protocol::AuthChallenge {
                challenge: "challenge".to_string(),
                salt: "salt".to_string(),
            };
            send_json(&mut ws, json!({"op": 0, "d": {
                "obsWebSocketVersion": "5.1.0",
                "rpcVersion": 1,
                "authentication": {"challenge": "challenge", "salt": "salt"}
            }}))
            .await;

            let identify = read_json(&mut ws).await;
            assert_eq!(identify["op"], 1);
            if identify["d"]["authentication"] != protocol::auth_response(password, &challenge) {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::from(CLOSE_AUTHENTICATION_FAILED),
                        reason: "Authentication failed.".into(),
                    }))
                    .await;
                return;
            }
            send_json(&mut ws, json!({"op": 2, "d": {"negotiatedRpcVersion": 1}})).await;

            let request = read_json(&mut ws).await;
            assert_eq!(request["op"], 6);
            assert_eq!(request["d"]["requestType"], "GetStreamStatus");
            send_json(&mut ws, json!({"op": 7, "d": {
                "requestType": "GetStreamStatus",
                "requestId": request["d"]["requestId"],
                "requestStatus": {"result": true, "code": 100},
                "responseData": {"outputActive": streaming, "outputReconnecting": false}
            }}))
            .await;

            send_json(&mut ws, json!({"op": 5, "d": {
                "eventType": "StreamStateChanged",
                "eventIntent": 64,
                "eventData": {"outputActive": false, "outputState": "OBS_WEBSOCKET_OUTPUT_STOPPED"}
            }}))
            .await;

            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
            }
        });

        port
    }

    #[tokio::test]
    async fn test_handshake_status_and_events() {
        let port = spawn_fake_obs("hunter2", true).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ObsClient::new(tx);

        let endpoint = Endpoint::new("ws://127.0.0.1", port).unwrap();
        let session = client.connect(&endpoint, "hunter2").unwrap();

        assert_eq!(recv_event(&mut rx).await, ClientEvent::Connected { session });
        let status = client.stream_status().await.unwrap();
        assert!(status.active);

        assert_eq!(
            recv_event(&mut rx).await,
            ClientEvent::StreamStateChanged { session, active: false }
        );

        client.disconnect();
        assert_eq!(
            recv_event(&mut rx).await,
            ClientEvent::Disconnected { session, reason: DisconnectReason::Requested }
        );
    }

    #[tokio::test]
    async fn test_wrong_password_reports_close_code() {
        let port = spawn_fake_obs("correct horse", false).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ObsClient::new(tx);

        let endpoint = Endpoint::new("ws://127.0.0.1", port).unwrap();
        let session = client.connect(&endpoint, "wrong").unwrap();

        match recv_event(&mut rx).await {
            ClientEvent::Disconnected {
                session: ended,
                reason: DisconnectReason::Closed { code, .. },
            } => {
                assert_eq!(ended, session);
                assert_eq!(code, CLOSE_AUTHENTICATION_FAILED);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_async_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ObsClient::new(tx);
        let endpoint = Endpoint::new("ws://127.0.0.1", port).unwrap();

        // Initiation succeeds; the failure arrives as an event.
        let session = client.connect(&endpoint, "").unwrap();
        match recv_event(&mut rx).await {
            ClientEvent::Disconnected { session: ended, reason: DisconnectReason::Failed(_) } => {
                assert_eq!(ended, session);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_status_without_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = ObsClient::new(tx);
        assert!(matches!(
            client.stream_status().await,
            Err(ProtocolError::Connection(ConnectionError::NotConnected))
        ));
    }

    #[test]
    fn test_connect_outside_runtime_fails_initiation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = ObsClient::new(tx);
        let endpoint = Endpoint::new("ws://127.0.0.1", 4455).unwrap();
        assert!(matches!(
            client.connect(&endpoint, ""),
            Err(ConnectionError::Initiation(_))
        ));
    }

    #[test]
    fn test_close_reason_without_frame() {
        assert_eq!(
            close_reason(None),
            DisconnectReason::Closed { code: 1005, reason: String::new() }
        );
    }
}
