//! Overlay Presentation Layer
//!
//! Shows the live indicator on every monitor while streaming. A dedicated
//! worker thread owns the [`OverlayCoordinator`] and drains commands from a
//! single queue, so surface creation and repositioning never race with
//! topology changes.

pub mod coordinator;
pub mod position;
pub mod pulse;
pub mod surface;
pub mod topology;
pub mod viewport;
pub mod widgets;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

pub use coordinator::OverlayCoordinator;
pub use position::Anchor;
pub use surface::SurfaceFactory;
pub use topology::{MonitorTopology, TopologyWatcher};
pub use widgets::IndicatorShape;

use crate::shared::{OverlayCommand, OverlayStatus};

/// How often the worker retries an incomplete indicator set
pub const HEAL_INTERVAL: Duration = Duration::from_secs(2);

/// Indicator appearance, applied when the overlay set is shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub shape: IndicatorShape,
    /// Edge length in device-independent units
    pub size: u32,
    /// Base opacity (0.0 - 1.0)
    pub opacity: f32,
    /// Where on each monitor
    pub position: Anchor,
    /// Whether the indicator pulses
    pub pulse: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            shape: IndicatorShape::Star,
            size: 80,
            opacity: 0.9,
            position: Anchor::TopRight,
            pulse: true,
        }
    }
}

/// Handle to the overlay worker thread
pub struct OverlayManager {
    commands: Sender<OverlayCommand>,
    status: Arc<RwLock<OverlayStatus>>,
    worker: Option<JoinHandle<()>>,
}

impl OverlayManager {
    /// Start the worker with the given topology and surface factory
    pub fn spawn(
        topology: Arc<dyn MonitorTopology>,
        factory: Box<dyn SurfaceFactory>,
    ) -> Result<Self> {
        let (commands, receiver) = unbounded();
        let status = Arc::new(RwLock::new(OverlayStatus::default()));

        let worker_status = status.clone();
        let worker = std::thread::Builder::new()
            .name("overlay-worker".to_string())
            .spawn(move || {
                info!("Overlay worker starting...");
                let coordinator = OverlayCoordinator::new(topology, factory);
                run_worker(coordinator, receiver, worker_status);
                info!("Overlay worker exiting...");
            })?;

        Ok(Self {
            commands,
            status,
            worker: Some(worker),
        })
    }

    /// Get a sender for queueing commands from other threads
    pub fn sender(&self) -> Sender<OverlayCommand> {
        self.commands.clone()
    }

    pub fn show(&self, config: OverlayConfig) {
        self.send(OverlayCommand::Show(config));
    }

    pub fn preview(&self, config: OverlayConfig) {
        self.send(OverlayCommand::Preview(config));
    }

    pub fn hide(&self, force: bool) {
        self.send(OverlayCommand::Hide { force });
    }

    pub fn topology_changed(&self) {
        self.send(OverlayCommand::TopologyChanged);
    }

    /// Latest snapshot published by the worker
    pub fn status(&self) -> OverlayStatus {
        *self.status.read()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Close all surfaces and wait for the worker to exit
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(OverlayCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, command: OverlayCommand) {
        if self.commands.send(command).is_err() {
            debug!("Overlay worker gone, dropping command");
        }
    }
}

impl Drop for OverlayManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut coordinator: OverlayCoordinator,
    receiver: Receiver<OverlayCommand>,
    status: Arc<RwLock<OverlayStatus>>,
) {
    loop {
        match receiver.recv_timeout(HEAL_INTERVAL) {
            Ok(command) => {
                if !apply(&mut coordinator, command) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => coordinator.heal(),
            Err(RecvTimeoutError::Disconnected) => {
                coordinator.hide_set(true);
                break;
            }
        }
        *status.write() = coordinator.status();
    }
    *status.write() = coordinator.status();
}

/// Returns false once the worker should stop
fn apply(coordinator: &mut OverlayCoordinator, command: OverlayCommand) -> bool {
    match command {
        OverlayCommand::Show(config) => coordinator.show_set(&config, false),
        OverlayCommand::Preview(config) => coordinator.show_set(&config, true),
        OverlayCommand::Hide { force } => coordinator.hide_set(force),
        OverlayCommand::TopologyChanged => coordinator.on_topology_changed(),
        OverlayCommand::Shutdown => {
            coordinator.hide_set(true);
            return false;
        }
    }
    true
}
