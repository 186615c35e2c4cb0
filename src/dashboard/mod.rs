//! Status window
//!
//! The eframe root viewport: a small panel showing connection, streaming and
//! overlay state, with the preview and reconnect controls. It also hosts the
//! indicator viewports every frame.

pub mod app;
pub mod theme;
pub mod views;
pub mod components;
