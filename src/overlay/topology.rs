//! Monitor topology
//!
//! Enumerates the attached monitors with their physical bounds and per-monitor
//! DPI scale, and watches for changes.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use egui::{Pos2, Rect, Vec2};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("monitor enumeration failed: {0}")]
    Enumeration(String),
    #[error("monitor topology not available yet")]
    Unavailable,
}

/// One monitor as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorDescriptor {
    /// Physical pixels
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    /// Physical pixels per device-independent unit
    pub dpi_scale_x: f32,
    pub dpi_scale_y: f32,
}

impl MonitorDescriptor {
    pub fn new(left: i32, top: i32, width: u32, height: u32, dpi_scale: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            dpi_scale_x: dpi_scale,
            dpi_scale_y: dpi_scale,
        }
    }

    /// Bounds in device-independent units, using this monitor's own scale
    pub fn logical_rect(&self) -> Rect {
        let sx = sanitize_scale(self.dpi_scale_x);
        let sy = sanitize_scale(self.dpi_scale_y);
        Rect::from_min_size(
            Pos2::new(self.left as f32 / sx, self.top as f32 / sy),
            Vec2::new(self.width as f32 / sx, self.height as f32 / sy),
        )
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Source of the current monitor list. Order is whatever the OS reports.
pub trait MonitorTopology: Send + Sync {
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, TopologyError>;
}

/// Win32 enumeration with per-monitor effective DPI
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Topology;

#[cfg(windows)]
impl MonitorTopology for Win32Topology {
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, TopologyError> {
        win32::enumerate()
    }
}

#[cfg(windows)]
mod win32 {
    use super::{MonitorDescriptor, TopologyError};
    use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO,
    };
    use windows::Win32::UI::HiDpi::{GetDpiForMonitor, MDT_EFFECTIVE_DPI};

    const BASE_DPI: f32 = 96.0;

    unsafe extern "system" fn collect_monitor(
        hmonitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        let handles = &mut *(lparam.0 as *mut Vec<HMONITOR>);
        handles.push(hmonitor);
        BOOL(1)
    }

    pub fn enumerate() -> Result<Vec<MonitorDescriptor>, TopologyError> {
        let mut handles: Vec<HMONITOR> = Vec::new();
        let ok = unsafe {
            EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(collect_monitor),
                LPARAM(&mut handles as *mut Vec<HMONITOR> as isize),
            )
        };
        if !ok.as_bool() {
            return Err(TopologyError::Enumeration(
                "EnumDisplayMonitors returned FALSE".to_string(),
            ));
        }

        let mut monitors = Vec::with_capacity(handles.len());
        for hmonitor in handles {
            let mut info = MONITORINFO {
                cbSize: std::mem::size_of::<MONITORINFO>() as u32,
                ..Default::default()
            };
            if !unsafe { GetMonitorInfoW(hmonitor, &mut info) }.as_bool() {
                tracing::warn!("GetMonitorInfoW failed for a monitor, skipping it");
                continue;
            }
            let rc = info.rcMonitor;

            let (mut dpi_x, mut dpi_y) = (0u32, 0u32);
            let (scale_x, scale_y) =
                match unsafe { GetDpiForMonitor(hmonitor, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y) } {
                    Ok(()) => (dpi_x as f32 / BASE_DPI, dpi_y as f32 / BASE_DPI),
                    Err(e) => {
                        tracing::warn!("GetDpiForMonitor failed ({}), assuming 96 DPI", e);
                        (1.0, 1.0)
                    }
                };

            monitors.push(MonitorDescriptor {
                left: rc.left,
                top: rc.top,
                width: (rc.right - rc.left).max(0) as u32,
                height: (rc.bottom - rc.top).max(0) as u32,
                dpi_scale_x: scale_x,
                dpi_scale_y: scale_y,
            });
        }
        Ok(monitors)
    }
}

/// Topology reported by the host's own egui viewport. Used where no native
/// enumeration exists; always a single monitor.
#[derive(Debug, Clone, Default)]
pub struct ViewportTopology {
    latest: Arc<RwLock<Option<MonitorDescriptor>>>,
}

impl ViewportTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the monitor the root viewport currently sits on
    pub fn report(&self, monitor: MonitorDescriptor) {
        let mut latest = self.latest.write();
        if latest.as_ref() != Some(&monitor) {
            debug!("Viewport reported monitor {:?}", monitor);
            *latest = Some(monitor);
        }
    }

    /// Build a descriptor from what egui knows about the root viewport
    pub fn report_from_viewport(&self, info: &egui::ViewportInfo) {
        let (Some(size), Some(scale)) = (info.monitor_size, info.native_pixels_per_point) else {
            return;
        };
        self.report(MonitorDescriptor::new(
            0,
            0,
            (size.x * scale).round() as u32,
            (size.y * scale).round() as u32,
            scale,
        ));
    }
}

impl MonitorTopology for ViewportTopology {
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, TopologyError> {
        self.latest
            .read()
            .map(|monitor| vec![monitor])
            .ok_or(TopologyError::Unavailable)
    }
}

/// The topology for this platform. The second value is set when the host
/// window has to feed the topology itself.
#[cfg(windows)]
pub fn platform_topology() -> (Arc<dyn MonitorTopology>, Option<ViewportTopology>) {
    (Arc::new(Win32Topology), None)
}

#[cfg(not(windows))]
pub fn platform_topology() -> (Arc<dyn MonitorTopology>, Option<ViewportTopology>) {
    let viewport = ViewportTopology::new();
    (Arc::new(viewport.clone()), Some(viewport))
}

/// Polls a topology and calls `on_change` whenever the monitor list differs
/// from the previous successful enumeration.
pub struct TopologyWatcher {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TopologyWatcher {
    pub fn spawn<F>(
        topology: Arc<dyn MonitorTopology>,
        interval: Duration,
        on_change: F,
    ) -> std::io::Result<Self>
    where
        F: Fn(&[MonitorDescriptor]) + Send + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("topology-watcher".to_string())
            .spawn(move || {
                let mut previous = topology.enumerate_monitors().ok();
                debug!("Topology watcher started with {:?} monitors", previous.as_ref().map(Vec::len));

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    match topology.enumerate_monitors() {
                        Ok(current) => {
                            if previous.as_ref() != Some(&current) {
                                info!("Display settings changed ({} monitors)", current.len());
                                on_change(&current);
                                previous = Some(current);
                            }
                        }
                        Err(e) => warn!("Topology query failed: {}", e),
                    }
                }
                debug!("Topology watcher stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TopologyWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
