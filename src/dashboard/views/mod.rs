//! Dashboard views

pub mod home;

pub use home::render_home_view;
