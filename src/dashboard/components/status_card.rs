//! Status card component

use egui::{Color32, RichText, Rounding, Vec2};
use crate::dashboard::theme::ThemeColors;

/// A card with a title, a value and a coloured status line
pub struct StatusCard {
    pub title: String,
    pub value: String,
    pub status: CardStatus,
    /// Replaces the default status label
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CardStatus {
    Live,
    Active,
    Inactive,
    Warning,
    Error,
}

impl CardStatus {
    pub fn color(&self) -> Color32 {
        match self {
            CardStatus::Live => ThemeColors::ACCENT_LIVE,
            CardStatus::Active => ThemeColors::STATUS_RUNNING,
            CardStatus::Inactive => ThemeColors::STATUS_STOPPED,
            CardStatus::Warning => ThemeColors::ACCENT_WARNING,
            CardStatus::Error => ThemeColors::STATUS_ERROR,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CardStatus::Live => "On air",
            CardStatus::Active => "Active",
            CardStatus::Inactive => "Inactive",
            CardStatus::Warning => "Waiting",
            CardStatus::Error => "Error",
        }
    }
}

impl StatusCard {
    pub fn new(title: impl Into<String>, value: impl Into<String>, status: CardStatus) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        egui::Frame::none()
            .fill(ThemeColors::BG_MEDIUM)
            .rounding(Rounding::same(8.0))
            .inner_margin(14.0)
            .show(ui, |ui| {
                ui.set_min_width(150.0);

                ui.horizontal(|ui| {
                    let dot = ui.cursor().left_top() + Vec2::new(5.0, 9.0);
                    ui.painter().circle_filled(dot, 4.0, self.status.color());
                    ui.add_space(14.0);

                    ui.vertical(|ui| {
                        ui.label(
                            RichText::new(&self.title)
                                .size(12.0)
                                .color(ThemeColors::TEXT_MUTED),
                        );
                        ui.add_space(2.0);
                        ui.label(
                            RichText::new(&self.value)
                                .size(17.0)
                                .color(ThemeColors::TEXT_PRIMARY)
                                .strong(),
                        );
                        ui.add_space(2.0);
                        ui.label(
                            RichText::new(self.detail.as_deref().unwrap_or(self.status.label()))
                                .size(11.0)
                                .color(self.status.color()),
                        );
                    });
                });
            });
    }
}
