//! Shared state and messaging between the host window, the connection
//! runtime and the overlay worker

pub mod state;
pub mod messages;

pub use state::SharedAppState;
pub use messages::{HostCommand, OverlayCommand, OverlayStatus};
