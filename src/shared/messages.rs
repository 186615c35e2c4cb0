//! Message types passed between contexts

use crate::overlay::OverlayConfig;

/// Commands drained serially by the overlay worker
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayCommand {
    /// Show the overlay set (streaming went live)
    Show(OverlayConfig),
    /// Show the overlay set as a manual preview
    Preview(OverlayConfig),
    /// Hide the overlay set; without `force` a preview stays up
    Hide { force: bool },
    /// Monitors were added, removed or reconfigured
    TopologyChanged,
    /// Close everything and stop the worker
    Shutdown,
}

/// Requests from the status window, consumed by the host once per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    StartTest,
    StopTest,
    Reconnect,
}

/// Snapshot of the overlay worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStatus {
    /// Whether the overlay set is shown
    pub shown: bool,
    /// Whether it was shown as a preview
    pub test_mode: bool,
    /// Live surfaces
    pub surfaces: usize,
    /// Monitors seen by the last successful enumeration
    pub monitors: usize,
}
