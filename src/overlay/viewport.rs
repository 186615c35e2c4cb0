//! egui viewport surfaces
//!
//! The overlay worker cannot touch windows directly; egui owns them on the UI
//! thread. Surfaces therefore write snapshots into a shared registry and the
//! host window renders one borderless, transparent, click-through viewport
//! per visible entry every frame.

use egui::{Color32, Pos2, ViewportBuilder, ViewportId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::pulse::Pulse;
use super::surface::{OverlaySurface, SurfaceError, SurfaceFactory};
use super::topology::MonitorDescriptor;
use super::widgets::{paint_indicator, IndicatorStyle, ShapeDescriptor};

/// Frame interval while any indicator pulses
const ANIMATION_FRAME: Duration = Duration::from_millis(16);

/// What the UI thread needs to draw one surface
#[derive(Debug, Clone)]
pub struct SurfaceSnapshot {
    pub monitor: MonitorDescriptor,
    pub shape: ShapeDescriptor,
    pub size: f32,
    pub opacity: f32,
    pub pulse: Pulse,
    pub position: Option<Pos2>,
    pub visible: bool,
}

impl SurfaceSnapshot {
    fn new(monitor: MonitorDescriptor) -> Self {
        Self {
            monitor,
            shape: ShapeDescriptor::default(),
            size: 0.0,
            opacity: 1.0,
            pulse: Pulse::default(),
            position: None,
            visible: false,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    surfaces: BTreeMap<u64, SurfaceSnapshot>,
    repaint: Option<egui::Context>,
}

/// Surfaces shared between the overlay worker and the UI thread
#[derive(Clone, Default)]
pub struct SurfaceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the registry wake the UI thread when a surface changes
    pub fn attach(&self, ctx: &egui::Context) {
        let mut inner = self.inner.write();
        if inner.repaint.is_none() {
            inner.repaint = Some(ctx.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u64) -> Option<SurfaceSnapshot> {
        self.inner.read().surfaces.get(&id).cloned()
    }

    /// Visible surfaces that already have a position
    pub fn drawable(&self) -> Vec<(u64, SurfaceSnapshot)> {
        self.inner
            .read()
            .surfaces
            .iter()
            .filter(|(_, s)| s.visible && s.position.is_some())
            .map(|(id, s)| (*id, s.clone()))
            .collect()
    }

    fn insert(&self, id: u64, snapshot: SurfaceSnapshot) {
        self.inner.write().surfaces.insert(id, snapshot);
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut SurfaceSnapshot)) {
        let repaint = {
            let mut inner = self.inner.write();
            if let Some(snapshot) = inner.surfaces.get_mut(&id) {
                f(snapshot);
            }
            inner.repaint.clone()
        };
        if let Some(ctx) = repaint {
            ctx.request_repaint();
        }
    }

    fn remove(&self, id: u64) {
        let repaint = {
            let mut inner = self.inner.write();
            inner.surfaces.remove(&id);
            inner.repaint.clone()
        };
        if let Some(ctx) = repaint {
            ctx.request_repaint();
        }
    }
}

/// A surface backed by a registry entry
pub struct ViewportSurface {
    id: u64,
    size: f32,
    registry: SurfaceRegistry,
    closed: bool,
}

impl OverlaySurface for ViewportSurface {
    fn set_shape(&mut self, shape: ShapeDescriptor) {
        self.registry.update(self.id, |s| s.shape = shape);
    }

    fn set_size(&mut self, size: f32) {
        self.size = size;
        self.registry.update(self.id, |s| s.size = size);
    }

    fn size(&self) -> f32 {
        self.size
    }

    fn set_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        self.registry.update(self.id, |s| s.opacity = opacity);
    }

    fn set_pulse_enabled(&mut self, enabled: bool) {
        let now = Instant::now();
        self.registry.update(self.id, |s| s.pulse.set_enabled(enabled, now));
    }

    fn show(&mut self) -> Result<(), SurfaceError> {
        if self.closed || self.registry.get(self.id).is_none() {
            return Err(SurfaceError::Show(format!("surface {} was closed", self.id)));
        }
        self.registry.update(self.id, |s| s.visible = true);
        Ok(())
    }

    fn set_position(&mut self, position: Pos2) {
        self.registry.update(self.id, |s| s.position = Some(position));
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.registry.remove(self.id);
        }
    }
}

impl Drop for ViewportSurface {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct ViewportSurfaceFactory {
    registry: SurfaceRegistry,
    next_id: u64,
}

impl ViewportSurfaceFactory {
    pub fn new(registry: SurfaceRegistry) -> Self {
        Self { registry, next_id: 0 }
    }
}

impl SurfaceFactory for ViewportSurfaceFactory {
    fn create(&mut self, monitor: &MonitorDescriptor) -> Result<Box<dyn OverlaySurface>, SurfaceError> {
        self.next_id += 1;
        let id = self.next_id;
        self.registry.insert(id, SurfaceSnapshot::new(*monitor));
        debug!("Created indicator surface {} for monitor at ({}, {})", id, monitor.left, monitor.top);

        Ok(Box::new(ViewportSurface {
            id,
            size: 0.0,
            registry: self.registry.clone(),
            closed: false,
        }))
    }
}

/// Convert a length in a monitor's device-independent units into egui points.
/// egui multiplies points by the host's scale, the OS expects the monitor's.
fn to_points(value: f32, monitor_scale: f32, pixels_per_point: f32) -> f32 {
    if pixels_per_point > 0.0 {
        value * monitor_scale / pixels_per_point
    } else {
        value
    }
}

/// Render every visible surface as its own immediate viewport. Call once per
/// frame from the root viewport.
pub fn show_surfaces(ctx: &egui::Context, registry: &SurfaceRegistry, style: &IndicatorStyle) {
    registry.attach(ctx);

    let now = Instant::now();
    let ppp = ctx.pixels_per_point();
    let mut animating = false;

    for (id, surface) in registry.drawable() {
        let Some(position) = surface.position else {
            continue;
        };
        let scale = surface.monitor.dpi_scale_x;
        let side = to_points(surface.size, scale, ppp);
        let origin = Pos2::new(
            to_points(position.x, scale, ppp),
            to_points(position.y, scale, ppp),
        );

        let frame = surface.pulse.sample(now);
        animating |= surface.pulse.is_enabled();

        let builder = ViewportBuilder::default()
            .with_title("Live indicator")
            .with_decorations(false)
            .with_transparent(true)
            .with_always_on_top()
            .with_mouse_passthrough(true)
            .with_taskbar(false)
            .with_resizable(false)
            .with_inner_size([side, side])
            .with_position(origin);

        ctx.show_viewport_immediate(
            ViewportId::from_hash_of(("live-indicator", id)),
            builder,
            |ctx, _class| {
                egui::CentralPanel::default()
                    .frame(egui::Frame::none().fill(Color32::TRANSPARENT))
                    .show(ctx, |ui| {
                        paint_indicator(
                            ui.painter(),
                            ui.max_rect(),
                            &surface.shape,
                            style,
                            surface.opacity * frame.opacity,
                            frame.scale,
                        );
                    });
            },
        );
    }

    if animating {
        ctx.request_repaint_after(ANIMATION_FRAME);
    }
}
