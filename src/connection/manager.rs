//! Connection resilience manager
//!
//! A single actor task owns the client, the connection state machine and the
//! reconnect deadline. The public [`ConnectionManager`] handle only sends it
//! commands, so every transition is serialized without locks.
//!
//! The streaming signal is published on an unbounded channel: the actor never
//! waits on a subscriber, and the transport's session task never runs
//! subscriber code. The status query issued after a handshake runs as its own
//! task and reports back to the actor, so commands and disposal are never
//! stuck behind a network round-trip.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{ClientEvent, ControlChannelClient, Endpoint, SessionId};
use super::error::{ConnectionError, DisconnectReason};

/// Fixed delay before a reconnect attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Upper bound for the stream status query issued after connecting
pub const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectPending,
    /// Terminal, reached through [`ConnectionManager::dispose`]
    Disposed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::ReconnectPending => "Reconnecting",
            ConnectionState::Disposed => "Stopped",
        }
    }

    fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    url: String,
    port: u16,
    password: String,
}

enum Command {
    Connect {
        credentials: Credentials,
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        allow_auto_reconnect: bool,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the resilience manager actor. Dropping it disposes the manager.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the actor on the current tokio runtime.
    ///
    /// `client_events` must be the receiving end of the channel the client
    /// reports on. Returns the handle and the streaming signal receiver.
    pub fn spawn<C: ControlChannelClient>(
        client: C,
        client_events: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<bool>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let actor = Actor {
            client: Arc::new(client),
            client_events,
            commands: command_rx,
            status_tx,
            status_rx,
            shutdown: shutdown.clone(),
            state: state_tx,
            signal: StreamingPublisher::new(signal_tx, shutdown.clone()),
            session: None,
            status_pending: None,
            credentials: None,
            auto_reconnect: true,
            reconnect_at: None,
        };
        let task = tokio::spawn(actor.run());

        (
            Self {
                commands,
                state,
                shutdown,
                task,
            },
            signal_rx,
        )
    }

    /// Initiate a connection. Returns once the attempt has started; `false`
    /// only when initiation itself failed or the manager is disposed.
    pub async fn connect(&self, url: &str, port: u16, password: &str) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        debug!("Connect requested for {}:{}", url, port);

        let (reply, response) = oneshot::channel();
        let command = Command::Connect {
            credentials: Credentials {
                url: url.to_string(),
                port,
                password: password.to_string(),
            },
            reply,
        };
        if self.commands.send(command).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Disconnect. With `allow_auto_reconnect = false` any pending reconnect is
    /// cancelled and none is scheduled for this disconnect.
    pub async fn disconnect(&self, allow_auto_reconnect: bool) {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::Disconnect {
                allow_auto_reconnect,
                reply,
            })
            .is_ok()
        {
            let _ = response.await;
        }
    }

    /// Permanently stop the manager. Idempotent.
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Disposing connection manager");
            self.shutdown.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Whether the actor task has finished (only after disposal)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Last-value publisher for the streaming signal. Silent once disposed.
struct StreamingPublisher {
    tx: Option<mpsc::UnboundedSender<bool>>,
    last: Option<bool>,
    shutdown: CancellationToken,
}

impl StreamingPublisher {
    fn new(tx: mpsc::UnboundedSender<bool>, shutdown: CancellationToken) -> Self {
        Self {
            tx: Some(tx),
            last: None,
            shutdown,
        }
    }

    /// Publish unless `active` equals the last published value
    fn publish(&mut self, active: bool) {
        if self.last != Some(active) {
            self.publish_always(active);
        }
    }

    fn publish_always(&mut self, active: bool) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Some(tx) = &self.tx {
            self.last = Some(active);
            let _ = tx.send(active);
        }
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

/// Outcome of a status query, tagged with the session it was issued for
type StatusReply = (SessionId, bool);

struct Actor<C> {
    client: Arc<C>,
    client_events: mpsc::UnboundedReceiver<ClientEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    status_tx: mpsc::UnboundedSender<StatusReply>,
    status_rx: mpsc::UnboundedReceiver<StatusReply>,
    shutdown: CancellationToken,
    state: watch::Sender<ConnectionState>,
    signal: StreamingPublisher,
    session: Option<SessionId>,
    /// Session whose initial status query has not been answered yet
    status_pending: Option<SessionId>,
    credentials: Option<Credentials>,
    auto_reconnect: bool,
    /// The only deferred operation; at most one exists by construction
    reconnect_at: Option<Instant>,
}

impl<C: ControlChannelClient> Actor<C> {
    async fn run(mut self) {
        loop {
            let deadline = self.reconnect_at;
            let reconnect = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.dispose();
                    break;
                }
                Some(command) = self.commands.recv() => self.handle_command(command),
                Some(event) = self.client_events.recv() => self.handle_event(event),
                Some((session, active)) = self.status_rx.recv() => self.on_status(session, active),
                _ = reconnect => self.reconnect_due(),
            }
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state {:?} -> {:?}", previous, state);
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { credentials, reply } => {
                let initiated = self.connect(credentials);
                let _ = reply.send(initiated);
            }
            Command::Disconnect {
                allow_auto_reconnect,
                reply,
            } => {
                self.disconnect(allow_auto_reconnect);
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self, credentials: Credentials) -> bool {
        if self.current_state().is_active() {
            debug!("Already connected, disconnecting first");
            self.client.disconnect();
            self.on_disconnected(DisconnectReason::Requested, false);
        }

        self.auto_reconnect = true;
        self.reconnect_at = None;
        self.credentials = Some(credentials.clone());

        match self.initiate(&credentials) {
            Ok(session) => {
                self.session = Some(session);
                true
            }
            Err(e) => {
                error!("Failed to connect to OBS: {}", e);
                self.session = None;
                self.set_state(ConnectionState::Disconnected);
                if !e.is_permanent() {
                    self.schedule_reconnect();
                }
                false
            }
        }
    }

    fn initiate(&mut self, credentials: &Credentials) -> Result<SessionId, ConnectionError> {
        let endpoint = Endpoint::new(&credentials.url, credentials.port)?;
        info!("Attempting to connect to {}...", endpoint);
        self.set_state(ConnectionState::Connecting);
        let session = self.client.connect(&endpoint, &credentials.password)?;
        debug!("Connection initiated as session {} (waiting for handshake)", session);
        Ok(session)
    }

    fn disconnect(&mut self, allow_auto_reconnect: bool) {
        self.auto_reconnect = allow_auto_reconnect;

        if !allow_auto_reconnect && self.reconnect_at.take().is_some() {
            debug!("Cancelled pending reconnect");
            if self.current_state() == ConnectionState::ReconnectPending {
                self.set_state(ConnectionState::Disconnected);
            }
        }

        if self.current_state().is_active() {
            self.client.disconnect();
            self.on_disconnected(DisconnectReason::Requested, true);
        }
    }

    fn handle_event(&mut self, event: ClientEvent) {
        if self.session != Some(event.session()) {
            debug!("Ignoring stale event from session {}", event.session());
            return;
        }

        match event {
            ClientEvent::Connected { session } => {
                self.set_state(ConnectionState::Connected);
                info!("Connected to OBS WebSocket");
                self.query_stream_status(session);
            }
            ClientEvent::Disconnected { reason, .. } => {
                self.on_disconnected(reason, true);
            }
            ClientEvent::StreamStateChanged { active, .. } => {
                if self.current_state() == ConnectionState::Connected {
                    // A live event is newer than any pending status reply
                    self.status_pending = None;
                    info!(
                        "Stream state changed: {}",
                        if active { "Started" } else { "Stopped" }
                    );
                    self.signal.publish(active);
                }
            }
        }
    }

    /// Ask for the current stream state off the actor loop
    fn query_stream_status(&mut self, session: SessionId) {
        self.status_pending = Some(session);
        let client = self.client.clone();
        let replies = self.status_tx.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let query = tokio::time::timeout(STATUS_QUERY_TIMEOUT, client.stream_status());
            let active = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = query => match result {
                    Ok(Ok(status)) => status.active,
                    Ok(Err(e)) => {
                        warn!("Error getting initial streaming state: {}", e);
                        false
                    }
                    Err(_) => {
                        warn!("Timed out getting initial streaming state");
                        false
                    }
                },
            };
            let _ = replies.send((session, active));
        });
    }

    fn on_status(&mut self, session: SessionId, active: bool) {
        if self.status_pending != Some(session) || self.session != Some(session) {
            debug!("Dropping status reply for session {}", session);
            return;
        }
        self.status_pending = None;
        debug!("Initial streaming state: {}", active);
        self.signal.publish(active);
    }

    /// Streaming goes false before the reconnect policy is evaluated
    fn on_disconnected(&mut self, reason: DisconnectReason, allow_reconnect: bool) {
        self.session = None;
        self.status_pending = None;
        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected from OBS WebSocket: {}", reason);
        self.signal.publish_always(false);

        if allow_reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect || self.credentials.is_none() {
            return;
        }
        if self.reconnect_at.is_some() {
            debug!("Reconnect already pending");
            return;
        }

        info!("Scheduling reconnect in {} seconds...", RECONNECT_DELAY.as_secs());
        self.reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
        self.set_state(ConnectionState::ReconnectPending);
    }

    fn reconnect_due(&mut self) {
        self.reconnect_at = None;

        if !self.auto_reconnect || self.current_state().is_active() {
            if self.current_state() == ConnectionState::ReconnectPending {
                self.set_state(ConnectionState::Disconnected);
            }
            return;
        }

        if let Some(credentials) = self.credentials.clone() {
            info!("Attempting to reconnect...");
            self.connect(credentials);
        }
    }

    fn dispose(&mut self) {
        self.auto_reconnect = false;
        self.reconnect_at = None;
        if self.current_state().is_active() {
            self.client.disconnect();
        }
        self.session = None;
        self.status_pending = None;
        self.signal.close();
        self.set_state(ConnectionState::Disposed);
        info!("Connection manager disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::client::StreamStatus;
    use crate::connection::error::ProtocolError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct MockState {
        connects: Vec<String>,
        disconnects: usize,
        next_session: u64,
        streaming: bool,
        status_fails: bool,
        status_delay: Option<Duration>,
        initiation_fails: bool,
    }

    #[derive(Clone, Default)]
    struct MockClient {
        state: Arc<Mutex<MockState>>,
    }

    impl MockClient {
        fn connects(&self) -> usize {
            self.state.lock().connects.len()
        }

        fn disconnects(&self) -> usize {
            self.state.lock().disconnects
        }
    }

    #[async_trait]
    impl ControlChannelClient for MockClient {
        fn connect(&self, endpoint: &Endpoint, _secret: &str) -> Result<SessionId, ConnectionError> {
            let mut state = self.state.lock();
            state.connects.push(endpoint.to_string());
            if state.initiation_fails {
                return Err(ConnectionError::Initiation("socket unavailable".to_string()));
            }
            state.next_session += 1;
            Ok(SessionId(state.next_session))
        }

        fn disconnect(&self) {
            self.state.lock().disconnects += 1;
        }

        async fn stream_status(&self) -> Result<StreamStatus, ProtocolError> {
            let delay = self.state.lock().status_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let state = self.state.lock();
            if state.status_fails {
                Err(ProtocolError::SessionClosed)
            } else {
                Ok(StreamStatus { active: state.streaming })
            }
        }
    }

    struct Harness {
        manager: ConnectionManager,
        client: MockClient,
        events: mpsc::UnboundedSender<ClientEvent>,
        streaming: mpsc::UnboundedReceiver<bool>,
    }

    impl Harness {
        fn new() -> Self {
            let client = MockClient::default();
            let (events, event_rx) = mpsc::unbounded_channel();
            let (manager, streaming) = ConnectionManager::spawn(client.clone(), event_rx);
            Self {
                manager,
                client,
                events,
                streaming,
            }
        }

        fn emit(&self, event: ClientEvent) {
            self.events.send(event).unwrap();
        }

        async fn connect(&self) -> bool {
            self.manager.connect("ws://localhost", 4455, "secret").await
        }

        async fn next_signal(&mut self) -> bool {
            tokio::time::timeout(Duration::from_secs(1), self.streaming.recv())
                .await
                .expect("no streaming signal published")
                .expect("streaming channel closed")
        }

        fn no_signal(&mut self) -> bool {
            self.streaming.try_recv().is_err()
        }

        /// Let the actor drain everything queued so far
        async fn settle(&self) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_returns_before_handshake() {
        let mut h = Harness::new();
        assert!(h.connect().await);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(h.client.connects(), 1);
        assert!(h.no_signal());

        h.client.state.lock().streaming = true;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(h.next_signal().await);
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_endpoint_fails_without_retry() {
        let h = Harness::new();
        assert!(!h.manager.connect("localhost", 4455, "").await);
        assert_eq!(h.client.connects(), 0);

        tokio::time::sleep(RECONNECT_DELAY * 3).await;
        assert_eq!(h.client.connects(), 0);
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_publishes_false_then_reconnects_after_delay() {
        let mut h = Harness::new();
        h.client.state.lock().streaming = true;
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(h.next_signal().await);

        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Failed("network down".to_string()),
        });
        assert!(!h.next_signal().await);
        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);

        tokio::time::sleep(RECONNECT_DELAY - Duration::from_millis(100)).await;
        assert_eq!(h.client.connects(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.client.connects(), 2);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_publishes_false_even_when_already_false() {
        let mut h = Harness::new();
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(!h.next_signal().await);

        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Closed { code: 1001, reason: String::new() },
        });
        assert!(!h.next_signal().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_reconnect_pending() {
        let mut h = Harness::new();
        h.connect().await;
        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Failed("refused".to_string()),
        });
        assert!(!h.next_signal().await);

        // A duplicate callback and a disconnect that allows reconnecting must
        // not add a second timer.
        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Failed("refused".to_string()),
        });
        h.manager.disconnect(true).await;
        h.settle().await;
        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);

        tokio::time::sleep(RECONNECT_DELAY).await;
        assert_eq!(h.client.connects(), 2);

        tokio::time::sleep(RECONNECT_DELAY * 2).await;
        assert_eq!(h.client.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_indefinitely() {
        let mut h = Harness::new();
        h.connect().await;

        for attempt in 1..=4u64 {
            h.emit(ClientEvent::Disconnected {
                session: SessionId(attempt),
                reason: DisconnectReason::Failed("refused".to_string()),
            });
            assert!(!h.next_signal().await);
            tokio::time::sleep(RECONNECT_DELAY + Duration::from_millis(1)).await;
            assert_eq!(h.client.connects() as u64, attempt + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_initiation_failure_keeps_retrying() {
        let h = Harness::new();
        h.client.state.lock().initiation_fails = true;
        assert!(!h.connect().await);
        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);

        tokio::time::sleep(RECONNECT_DELAY * 2 + Duration::from_millis(1)).await;
        assert_eq!(h.client.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_without_auto_reconnect_cancels_pending() {
        let mut h = Harness::new();
        h.connect().await;
        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Failed("refused".to_string()),
        });
        assert!(!h.next_signal().await);
        assert_eq!(h.manager.state(), ConnectionState::ReconnectPending);

        h.manager.disconnect(false).await;
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);

        tokio::time::sleep(RECONNECT_DELAY * 3).await;
        assert_eq!(h.client.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_disconnect_while_connected() {
        let mut h = Harness::new();
        h.client.state.lock().streaming = true;
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(h.next_signal().await);

        h.manager.disconnect(false).await;
        assert_eq!(h.client.disconnects(), 1);
        assert!(!h.next_signal().await);
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);

        // The transport's late callback for the closed session is stale.
        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Requested,
        });
        tokio::time::sleep(RECONNECT_DELAY * 2).await;
        assert_eq!(h.client.connects(), 1);
        assert!(h.no_signal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connected_disconnects_cleanly_first() {
        let mut h = Harness::new();
        h.client.state.lock().streaming = true;
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(h.next_signal().await);

        assert!(h.manager.connect("ws://127.0.0.1", 4456, "").await);
        assert_eq!(h.client.disconnects(), 1);
        assert!(!h.next_signal().await);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);

        tokio::time::sleep(RECONNECT_DELAY * 2).await;
        assert_eq!(h.client.connects(), 2);
        assert_eq!(h.client.state.lock().connects[1], "ws://127.0.0.1:4456/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_query_failure_means_not_streaming() {
        let mut h = Harness::new();
        h.client.state.lock().status_fails = true;
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(!h.next_signal().await);
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_events_are_deduplicated() {
        let mut h = Harness::new();
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(!h.next_signal().await);

        h.emit(ClientEvent::StreamStateChanged { session: SessionId(1), active: true });
        h.emit(ClientEvent::StreamStateChanged { session: SessionId(1), active: true });
        assert!(h.next_signal().await);
        h.settle().await;
        assert!(h.no_signal());

        h.emit(ClientEvent::StreamStateChanged { session: SessionId(1), active: false });
        assert!(!h.next_signal().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_session_events_are_ignored() {
        let mut h = Harness::new();
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(!h.next_signal().await);

        h.emit(ClientEvent::StreamStateChanged { session: SessionId(99), active: true });
        h.emit(ClientEvent::Disconnected {
            session: SessionId(99),
            reason: DisconnectReason::Requested,
        });
        h.settle().await;
        assert!(h.no_signal());
        assert_eq!(h.manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_twice_is_safe_and_silences_publication() {
        let mut h = Harness::new();
        h.client.state.lock().streaming = true;
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        assert!(h.next_signal().await);

        h.manager.dispose();
        h.manager.dispose();
        h.settle().await;
        assert!(h.manager.is_disposed());
        assert_eq!(h.manager.state(), ConnectionState::Disposed);
        assert_eq!(h.client.disconnects(), 1);

        // Channel closes with nothing else published.
        assert_eq!(h.streaming.recv().await, None);
        assert!(!h.connect().await);
        assert!(h.manager.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_status_query_publishes_nothing() {
        let mut h = Harness::new();
        {
            let mut state = h.client.state.lock();
            state.streaming = true;
            state.status_delay = Some(Duration::from_secs(2));
        }
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        h.settle().await;

        h.manager.dispose();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.streaming.recv().await, None);
        assert_eq!(h.manager.state(), ConnectionState::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_do_not_wait_for_status_query() {
        let mut h = Harness::new();
        {
            let mut state = h.client.state.lock();
            state.streaming = true;
            state.status_delay = Some(STATUS_QUERY_TIMEOUT - Duration::from_secs(1));
        }
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        h.settle().await;

        let started = Instant::now();
        assert!(h.manager.connect("ws://localhost", 4455, "secret").await);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!h.next_signal().await);

        // The superseded session's late reply is dropped.
        tokio::time::sleep(STATUS_QUERY_TIMEOUT).await;
        assert!(h.no_signal());
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_event_overrides_late_status_reply() {
        let mut h = Harness::new();
        h.client.state.lock().status_delay = Some(Duration::from_secs(2));
        h.connect().await;
        h.emit(ClientEvent::Connected { session: SessionId(1) });
        h.settle().await;

        h.emit(ClientEvent::StreamStateChanged { session: SessionId(1), active: true });
        assert!(h.next_signal().await);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.no_signal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending_reconnect() {
        let mut h = Harness::new();
        h.connect().await;
        h.emit(ClientEvent::Disconnected {
            session: SessionId(1),
            reason: DisconnectReason::Failed("refused".to_string()),
        });
        assert!(!h.next_signal().await);

        h.manager.dispose();
        tokio::time::sleep(RECONNECT_DELAY * 3).await;
        assert_eq!(h.client.connects(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Disposed);
    }
}
