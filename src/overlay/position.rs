//! Where an indicator goes on a monitor

use egui::Pos2;
use serde::{Deserialize, Serialize};

use super::topology::MonitorDescriptor;

/// Distance from the monitor edge, in device-independent units
pub const MARGIN: f32 = 20.0;

/// Placement of the indicator on each monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    #[default]
    TopRight,
    TopCenter,
    BottomLeft,
    BottomRight,
    BottomCenter,
}

/// Top-left corner of a `size`-unit surface on `monitor`, in
/// device-independent units of that monitor
pub fn compute_position(monitor: &MonitorDescriptor, anchor: Anchor, size: f32) -> Pos2 {
    let bounds = monitor.logical_rect();
    let (left, top, right, bottom) = (bounds.left(), bounds.top(), bounds.right(), bounds.bottom());
    let center_x = left + (bounds.width() - size) / 2.0;

    match anchor {
        Anchor::TopLeft => Pos2::new(left + MARGIN, top + MARGIN),
        Anchor::TopRight => Pos2::new(right - size - MARGIN, top + MARGIN),
        Anchor::TopCenter => Pos2::new(center_x, top + MARGIN),
        Anchor::BottomLeft => Pos2::new(left + MARGIN, bottom - size - MARGIN),
        Anchor::BottomRight => Pos2::new(right - size - MARGIN, bottom - size - MARGIN),
        Anchor::BottomCenter => Pos2::new(center_x, bottom - size - MARGIN),
    }
}
