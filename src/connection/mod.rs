//! Connection to the streaming application's control channel
//!
//! Provides:
//! - The resilience manager that keeps a session alive and publishes the
//!   streaming signal
//! - The client seam it drives, with an obs-websocket v5 implementation

pub mod client;
pub mod error;
pub mod manager;
pub mod obs;
pub mod protocol;

pub use manager::{ConnectionManager, ConnectionState};
pub use obs::ObsClient;
