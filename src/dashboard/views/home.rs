//! Home view - status overview and controls

use egui::RichText;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::connection::ConnectionState;
use crate::dashboard::components::{CardStatus, StatusCard};
use crate::dashboard::theme::{color_with_alpha, ThemeColors};
use crate::shared::{HostCommand, SharedAppState};

/// A failed initiation shows as an error until the next attempt succeeds
fn connection_card(state: ConnectionState, failed: bool) -> CardStatus {
    match state {
        ConnectionState::Connected => CardStatus::Active,
        ConnectionState::Connecting | ConnectionState::ReconnectPending => CardStatus::Warning,
        ConnectionState::Disconnected if failed => CardStatus::Error,
        ConnectionState::Disconnected | ConnectionState::Disposed => CardStatus::Inactive,
    }
}

/// Render the home view
pub fn render_home_view(ui: &mut egui::Ui, shared_state: &Arc<RwLock<SharedAppState>>) {
    let app_state = shared_state.read().clone();
    let runtime = &app_state.runtime;
    let connection = &app_state.config.connection;

    ui.heading(RichText::new("OBS Live Indicator").strong());
    ui.label(
        RichText::new(format!("{}:{}", connection.url, connection.port))
            .size(13.0)
            .color(ThemeColors::TEXT_SECONDARY),
    );
    ui.add_space(16.0);

    ui.horizontal(|ui| {
        StatusCard::new(
            "OBS",
            runtime.connection.label(),
            connection_card(runtime.connection, runtime.last_error.is_some()),
        )
        .show(ui);

        ui.add_space(8.0);

        let (value, status) = if runtime.streaming {
            ("Live", CardStatus::Live)
        } else {
            ("Offline", CardStatus::Inactive)
        };
        StatusCard::new("Stream", value, status).show(ui);

        ui.add_space(8.0);

        let overlay = runtime.overlay;
        let status = match (overlay.shown, overlay.test_mode) {
            (true, true) => CardStatus::Warning,
            (true, false) => CardStatus::Live,
            _ => CardStatus::Inactive,
        };
        let card = StatusCard::new(
            "Indicators",
            format!("{}/{}", overlay.surfaces, overlay.monitors),
            status,
        );
        let card = match (overlay.shown, overlay.test_mode) {
            (true, true) => card.with_detail("Preview"),
            (true, false) => card.with_detail("Shown"),
            _ => card.with_detail("Hidden"),
        };
        card.show(ui);
    });

    ui.add_space(20.0);

    ui.horizontal(|ui| {
        let previewing = runtime.overlay.test_mode;
        let (text, color) = if previewing {
            ("Stop test", ThemeColors::ACCENT_ERROR)
        } else {
            ("Start test", ThemeColors::ACCENT_SUCCESS)
        };

        // A preview cannot be started or stopped while the stream is live
        let button = egui::Button::new(RichText::new(text).color(egui::Color32::WHITE))
            .fill(color)
            .min_size(egui::vec2(120.0, 32.0));
        let response = ui
            .add_enabled(app_state.can_preview(), button)
            .on_disabled_hover_text("Unavailable while streaming");
        if response.clicked() {
            shared_state.write().runtime.request(if previewing {
                HostCommand::StopTest
            } else {
                HostCommand::StartTest
            });
        }

        ui.add_space(8.0);

        if ui
            .add(egui::Button::new("Reconnect").min_size(egui::vec2(120.0, 32.0)))
            .clicked()
        {
            shared_state.write().runtime.request(HostCommand::Reconnect);
        }
    });

    if let Some(error) = &runtime.last_error {
        ui.add_space(16.0);
        egui::Frame::none()
            .fill(color_with_alpha(ThemeColors::ACCENT_ERROR, 51))
            .rounding(egui::Rounding::same(6.0))
            .inner_margin(10.0)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(RichText::new("Error:").color(ThemeColors::ACCENT_ERROR).strong());
                    ui.label(RichText::new(error).color(ThemeColors::TEXT_PRIMARY));
                });
            });
    }
}
