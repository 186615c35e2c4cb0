//! Overlay coordinator
//!
//! Keeps one indicator surface per monitor while the overlay set is shown.
//! Not thread-safe on purpose: it is owned by the overlay worker thread and
//! every mutation arrives through that thread's command queue.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::position::compute_position;
use super::surface::{OverlaySurface, SurfaceError, SurfaceFactory};
use super::topology::{MonitorDescriptor, MonitorTopology};
use super::widgets::ShapeDescriptor;
use super::OverlayConfig;
use crate::shared::OverlayStatus;

/// Config applied by the current `show_set`, with its shape resolved once
#[derive(Debug, Clone)]
struct AppliedConfig {
    config: OverlayConfig,
    shape: ShapeDescriptor,
}

pub struct OverlayCoordinator {
    topology: Arc<dyn MonitorTopology>,
    factory: Box<dyn SurfaceFactory>,
    surfaces: Vec<Box<dyn OverlaySurface>>,
    shown: bool,
    test_mode: bool,
    applied: Option<AppliedConfig>,
    /// Monitor count of the last successful enumeration while shown
    known_monitors: Option<usize>,
}

impl OverlayCoordinator {
    pub fn new(topology: Arc<dyn MonitorTopology>, factory: Box<dyn SurfaceFactory>) -> Self {
        Self {
            topology,
            factory,
            surfaces: Vec::new(),
            shown: false,
            test_mode: false,
            applied: None,
            known_monitors: None,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn status(&self) -> OverlayStatus {
        OverlayStatus {
            shown: self.shown,
            test_mode: self.test_mode,
            surfaces: self.surfaces.len(),
            monitors: self.known_monitors.unwrap_or(0),
        }
    }

    /// Show one surface per monitor. No-op while already shown, even with a
    /// different config.
    pub fn show_set(&mut self, config: &OverlayConfig, test_mode: bool) {
        if self.shown {
            debug!("Overlay set already shown, ignoring show");
            return;
        }

        let applied = AppliedConfig {
            config: config.clone(),
            shape: config.shape.descriptor(),
        };
        self.shown = true;
        self.test_mode = test_mode;

        let monitors = match self.topology.enumerate_monitors() {
            Ok(monitors) => monitors,
            Err(e) => {
                warn!("Could not enumerate monitors, showing no indicators for now: {}", e);
                self.applied = Some(applied);
                self.known_monitors = None;
                return;
            }
        };

        for (index, monitor) in monitors.iter().enumerate() {
            match self.create_surface(monitor, &applied) {
                Ok(surface) => self.surfaces.push(surface),
                Err(e) => warn!("Failed to create indicator for monitor {}: {}", index, e),
            }
        }
        self.known_monitors = Some(monitors.len());
        self.applied = Some(applied);

        info!(
            "Showing live indicator on {}/{} monitor(s){}",
            self.surfaces.len(),
            monitors.len(),
            if test_mode { " (test mode)" } else { "" }
        );
    }

    /// Close every surface. Without `force`, a test-mode preview is left up.
    pub fn hide_set(&mut self, force: bool) {
        if !self.shown {
            return;
        }
        if self.test_mode && !force {
            debug!("Test mode active, ignoring hide");
            return;
        }

        for mut surface in self.surfaces.drain(..) {
            surface.close();
        }
        self.shown = false;
        self.test_mode = false;
        self.applied = None;
        self.known_monitors = None;
        info!("Live indicator hidden");
    }

    /// Reconcile surfaces against a fresh enumeration. Only acts while shown.
    pub fn on_topology_changed(&mut self) {
        if !self.shown {
            return;
        }

        match self.topology.enumerate_monitors() {
            Ok(monitors) => self.reconcile(&monitors),
            Err(e) => warn!("Topology query failed, keeping current indicators: {}", e),
        }
    }

    /// Retry reconciliation when the live set is known to be incomplete
    pub fn heal(&mut self) {
        if !self.shown {
            return;
        }
        if self.known_monitors == Some(self.surfaces.len()) {
            return;
        }
        debug!(
            "Indicator set incomplete ({} surfaces, {:?} monitors), reconciling",
            self.surfaces.len(),
            self.known_monitors
        );
        self.on_topology_changed();
    }

    fn reconcile(&mut self, monitors: &[MonitorDescriptor]) {
        let Some(applied) = self.applied.clone() else {
            return;
        };
        let before = self.surfaces.len();

        while self.surfaces.len() > monitors.len() {
            if let Some(mut surface) = self.surfaces.pop() {
                surface.close();
            }
        }

        for monitor in monitors.iter().skip(self.surfaces.len()) {
            match self.create_surface(monitor, &applied) {
                Ok(surface) => self.surfaces.push(surface),
                Err(e) => warn!("Failed to create indicator for new monitor: {}", e),
            }
        }

        // Index i follows whichever monitor is now at position i
        for (surface, monitor) in self.surfaces.iter_mut().zip(monitors) {
            let position = compute_position(monitor, applied.config.position, surface.size());
            surface.set_position(position);
        }

        self.known_monitors = Some(monitors.len());
        if before != self.surfaces.len() {
            info!(
                "Indicator set reconciled: {} -> {} surface(s) for {} monitor(s)",
                before,
                self.surfaces.len(),
                monitors.len()
            );
        }
    }

    /// Apply shape, size, opacity and pulse, show, then position. Position
    /// last because it depends on the applied size.
    fn create_surface(
        &mut self,
        monitor: &MonitorDescriptor,
        applied: &AppliedConfig,
    ) -> Result<Box<dyn OverlaySurface>, SurfaceError> {
        let config = &applied.config;
        let mut surface = self.factory.create(monitor)?;

        surface.set_shape(applied.shape.clone());
        surface.set_size(config.size as f32);
        surface.set_opacity(config.opacity);
        surface.set_pulse_enabled(config.pulse);
        if let Err(e) = surface.show() {
            surface.close();
            return Err(e);
        }
        let position = compute_position(monitor, config.position, surface.size());
        surface.set_position(position);

        Ok(surface)
    }
}
