//! Overlay surface seam
//!
//! The coordinator only drives surfaces through these traits, so it can be
//! exercised without a window system.

use egui::Pos2;
use thiserror::Error;

use super::topology::MonitorDescriptor;
use super::widgets::ShapeDescriptor;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to create overlay surface: {0}")]
    Create(String),
    #[error("failed to show overlay surface: {0}")]
    Show(String),
}

/// One always-on-top, click-through indicator window
pub trait OverlaySurface: Send {
    fn set_shape(&mut self, shape: ShapeDescriptor);
    /// Edge length in device-independent units
    fn set_size(&mut self, size: f32);
    fn size(&self) -> f32;
    fn set_opacity(&mut self, opacity: f32);
    fn set_pulse_enabled(&mut self, enabled: bool);
    fn show(&mut self) -> Result<(), SurfaceError>;
    /// Top-left corner in device-independent units of the surface's monitor
    fn set_position(&mut self, position: Pos2);
    fn close(&mut self);
}

pub trait SurfaceFactory: Send {
    fn create(&mut self, monitor: &MonitorDescriptor) -> Result<Box<dyn OverlaySurface>, SurfaceError>;
}
