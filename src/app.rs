//! Application Coordinator
//!
//! Owns the tokio runtime, the connection manager, the overlay worker and the
//! topology watcher, and bridges the streaming signal into overlay commands.

use anyhow::{Context as _, Result};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::connection::{ConnectionManager, ConnectionState, ObsClient};
use crate::overlay::topology::{platform_topology, ViewportTopology};
use crate::overlay::viewport::{SurfaceRegistry, ViewportSurfaceFactory};
use crate::overlay::{OverlayConfig, OverlayManager, TopologyWatcher};
use crate::shared::{HostCommand, OverlayCommand, SharedAppState};

/// Main application coordinator
pub struct IndicatorApp {
    /// Shared state between the status window and the runtime
    shared_state: Arc<RwLock<SharedAppState>>,
    runtime: Option<Runtime>,
    connection: Arc<ConnectionManager>,
    overlay: OverlayManager,
    watcher: Option<TopologyWatcher>,
    bridge: Option<JoinHandle<()>>,
    /// Surfaces the status window renders
    registry: SurfaceRegistry,
    /// Set where the status window has to report the monitor itself
    viewport_topology: Option<ViewportTopology>,
}

impl IndicatorApp {
    /// Build every subsystem. Nothing connects until [`IndicatorApp::start`].
    pub fn new(config: AppConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("indicator-runtime")
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        let registry = SurfaceRegistry::new();
        let (topology, viewport_topology) = platform_topology();

        let overlay = OverlayManager::spawn(
            topology.clone(),
            Box::new(ViewportSurfaceFactory::new(registry.clone())),
        )?;

        let watcher_tx = overlay.sender();
        let watcher = TopologyWatcher::spawn(
            topology,
            Duration::from_millis(config.topology.poll_interval_ms),
            move |_monitors| {
                let _ = watcher_tx.send(OverlayCommand::TopologyChanged);
            },
        )
        .context("failed to start topology watcher")?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let client = ObsClient::new(events_tx);
        let (connection, streaming) = {
            let _guard = runtime.enter();
            ConnectionManager::spawn(client, events_rx)
        };
        let connection = Arc::new(connection);

        let shared_state = Arc::new(RwLock::new(SharedAppState::new(config.clone())));
        let bridge = runtime.spawn(bridge_streaming(
            streaming,
            connection.subscribe_state(),
            overlay.sender(),
            shared_state.clone(),
            config.indicator,
        ));

        Ok(Self {
            shared_state,
            runtime: Some(runtime),
            connection,
            overlay,
            watcher: Some(watcher),
            bridge: Some(bridge),
            registry,
            viewport_topology,
        })
    }

    /// Initiate the first connection with the configured credentials
    pub fn start(&self) {
        self.spawn_connect();
    }

    pub fn state(&self) -> Arc<RwLock<SharedAppState>> {
        self.shared_state.clone()
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn viewport_topology(&self) -> Option<&ViewportTopology> {
        self.viewport_topology.as_ref()
    }

    /// Handle the pending status window command, if any, and refresh the
    /// overlay snapshot. Called once per frame.
    pub fn process_commands(&self) {
        let (command, indicator, can_preview) = {
            let mut state = self.shared_state.write();
            state.runtime.overlay = self.overlay.status();
            (
                state.runtime.command.take(),
                state.config.indicator.clone(),
                state.can_preview(),
            )
        };

        match command {
            // A forced hide while live would take down the stream's indicators
            Some(HostCommand::StartTest | HostCommand::StopTest) if !can_preview => {
                debug!("Preview change refused while streaming");
            }
            Some(HostCommand::StartTest) => {
                info!("Starting indicator preview");
                self.overlay.preview(indicator);
            }
            Some(HostCommand::StopTest) => {
                info!("Stopping indicator preview");
                self.overlay.hide(true);
            }
            Some(HostCommand::Reconnect) => {
                info!("Reconnect requested");
                self.spawn_connect();
            }
            None => {}
        }
    }

    fn spawn_connect(&self) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let settings = self.shared_state.read().config.connection.clone();
        let connection = self.connection.clone();
        let shared_state = self.shared_state.clone();

        runtime.spawn(async move {
            let initiated = connection
                .connect(&settings.url, settings.port, &settings.password)
                .await;
            let mut state = shared_state.write();
            if initiated {
                state.runtime.clear_error();
            } else {
                state.runtime.set_error(format!(
                    "Could not connect to {}:{}",
                    settings.url, settings.port
                ));
            }
        });
    }

    /// Stop everything: the connection first so no late signal reaches the
    /// overlay, then the overlay worker.
    pub fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        info!("Shutting down...");

        self.connection.dispose();
        if let Some(bridge) = self.bridge.take() {
            let _ = runtime.block_on(async {
                tokio::time::timeout(Duration::from_secs(1), bridge).await
            });
        }
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.overlay.shutdown();
        runtime.shutdown_timeout(Duration::from_secs(2));
    }
}

impl Drop for IndicatorApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forward streaming signals to the overlay worker and mirror connection
/// state into the shared state. Ends when the connection manager is disposed.
async fn bridge_streaming(
    mut streaming: mpsc::UnboundedReceiver<bool>,
    mut connection_state: watch::Receiver<ConnectionState>,
    overlay: Sender<OverlayCommand>,
    shared_state: Arc<RwLock<SharedAppState>>,
    indicator: OverlayConfig,
) {
    let mut state_open = true;
    loop {
        tokio::select! {
            signal = streaming.recv() => {
                let Some(active) = signal else { break };
                shared_state.write().runtime.streaming = active;
                let command = if active {
                    info!("Stream is live, showing indicator");
                    OverlayCommand::Show(indicator.clone())
                } else {
                    info!("Stream is not live, hiding indicator");
                    OverlayCommand::Hide { force: false }
                };
                if overlay.send(command).is_err() {
                    warn!("Overlay worker gone, stopping bridge");
                    break;
                }
            }
            changed = connection_state.changed(), if state_open => {
                if changed.is_err() {
                    state_open = false;
                    continue;
                }
                let state = *connection_state.borrow_and_update();
                shared_state.write().runtime.connection = state;
            }
        }
    }

    let final_state = *connection_state.borrow();
    let mut state = shared_state.write();
    state.runtime.connection = final_state;
    state.runtime.streaming = false;
    debug!("Streaming bridge stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::OverlayStatus;

    struct Bridge {
        streaming: mpsc::UnboundedSender<bool>,
        state: watch::Sender<ConnectionState>,
        overlay: crossbeam_channel::Receiver<OverlayCommand>,
        shared: Arc<RwLock<SharedAppState>>,
        task: JoinHandle<()>,
    }

    fn spawn_bridge() -> Bridge {
        let (streaming, streaming_rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (overlay_tx, overlay) = crossbeam_channel::unbounded();
        let shared = Arc::new(RwLock::new(SharedAppState::new(AppConfig::default())));
        let task = tokio::spawn(bridge_streaming(
            streaming_rx,
            state_rx,
            overlay_tx,
            shared.clone(),
            OverlayConfig::default(),
        ));
        Bridge {
            streaming,
            state,
            overlay,
            shared,
            task,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// Run host frames until the overlay snapshot satisfies `predicate`
    fn frames_until(app: &IndicatorApp, predicate: impl Fn(&OverlayStatus) -> bool) -> OverlayStatus {
        for _ in 0..200 {
            app.process_commands();
            let status = app.state().read().runtime.overlay;
            if predicate(&status) {
                return status;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        app.state().read().runtime.overlay
    }

    #[test]
    fn test_stop_test_is_ignored_while_streaming() {
        let app = IndicatorApp::new(AppConfig::default()).unwrap();
        let state = app.state();

        state.write().runtime.request(HostCommand::StartTest);
        assert!(frames_until(&app, |s| s.test_mode).shown);

        // Stream went live in the same frame the stop click was queued
        state.write().runtime.streaming = true;
        state.write().runtime.request(HostCommand::StopTest);
        app.process_commands();
        std::thread::sleep(Duration::from_millis(100));
        let status = frames_until(&app, |_| true);
        assert!(status.shown && status.test_mode);

        state.write().runtime.streaming = false;
        state.write().runtime.request(HostCommand::StopTest);
        assert!(!frames_until(&app, |s| !s.shown).shown);
    }

    #[tokio::test]
    async fn test_signal_maps_to_overlay_commands() {
        let bridge = spawn_bridge();

        bridge.streaming.send(true).unwrap();
        bridge.streaming.send(false).unwrap();
        settle().await;

        assert_eq!(
            bridge.overlay.try_recv().unwrap(),
            OverlayCommand::Show(OverlayConfig::default())
        );
        assert_eq!(
            bridge.overlay.try_recv().unwrap(),
            OverlayCommand::Hide { force: false }
        );
        assert!(!bridge.shared.read().runtime.streaming);
    }

    #[tokio::test]
    async fn test_connection_state_is_mirrored() {
        let bridge = spawn_bridge();

        bridge.state.send(ConnectionState::Connected).unwrap();
        settle().await;
        assert_eq!(bridge.shared.read().runtime.connection, ConnectionState::Connected);

        bridge.streaming.send(true).unwrap();
        settle().await;
        assert!(bridge.shared.read().runtime.streaming);
    }

    #[tokio::test]
    async fn test_bridge_ends_when_signal_closes() {
        let bridge = spawn_bridge();
        bridge.streaming.send(true).unwrap();
        settle().await;

        bridge.state.send(ConnectionState::Disposed).unwrap();
        drop(bridge.streaming);
        bridge.task.await.unwrap();

        let state = bridge.shared.read();
        assert!(!state.runtime.streaming);
        assert_eq!(state.runtime.connection, ConnectionState::Disposed);
    }
}
