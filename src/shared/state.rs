//! Shared application state

use crate::config::AppConfig;
use crate::connection::ConnectionState;
use crate::shared::{HostCommand, OverlayStatus};

/// State shared between the status window and the host runtime
#[derive(Debug, Clone)]
pub struct SharedAppState {
    /// Configuration loaded at start-up
    pub config: AppConfig,
    /// Runtime state (not persisted)
    pub runtime: RuntimeState,
}

impl SharedAppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            runtime: RuntimeState::default(),
        }
    }

    /// The test preview may only be toggled while not live
    pub fn can_preview(&self) -> bool {
        !self.runtime.streaming
    }
}

/// Runtime state that is not persisted
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub connection: ConnectionState,
    /// Last streaming signal value
    pub streaming: bool,
    pub overlay: OverlayStatus,
    /// Pending command from the status window
    pub command: Option<HostCommand>,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            streaming: false,
            overlay: OverlayStatus::default(),
            command: None,
            last_error: None,
        }
    }
}

impl RuntimeState {
    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Queue a command unless one is already waiting
    pub fn request(&mut self, command: HostCommand) {
        if self.command.is_none() {
            self.command = Some(command);
        }
    }
}
