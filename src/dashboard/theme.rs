//! Dashboard theme and styling
//!
//! Dark broadcast-console theme with a red "on air" accent.

use egui::{Color32, FontFamily, FontId, Rounding, Stroke, TextStyle, Visuals};

pub struct ThemeColors;

impl ThemeColors {
    pub const BG_DARK: Color32 = Color32::from_rgb(16, 16, 20);
    pub const BG_MEDIUM: Color32 = Color32::from_rgb(26, 26, 32);
    pub const BG_LIGHT: Color32 = Color32::from_rgb(36, 36, 44);
    pub const BG_HOVER: Color32 = Color32::from_rgb(48, 48, 58);

    pub const ACCENT_LIVE: Color32 = Color32::from_rgb(229, 28, 35);
    pub const ACCENT_PRIMARY: Color32 = Color32::from_rgb(90, 160, 250);
    pub const ACCENT_SUCCESS: Color32 = Color32::from_rgb(46, 204, 113);
    pub const ACCENT_WARNING: Color32 = Color32::from_rgb(255, 193, 7);
    pub const ACCENT_ERROR: Color32 = Color32::from_rgb(231, 76, 60);

    pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(238, 238, 242);
    pub const TEXT_SECONDARY: Color32 = Color32::from_rgb(160, 160, 172);
    pub const TEXT_MUTED: Color32 = Color32::from_rgb(104, 104, 116);

    pub const BORDER: Color32 = Color32::from_rgb(52, 52, 64);

    pub const STATUS_RUNNING: Color32 = Color32::from_rgb(46, 204, 113);
    pub const STATUS_STOPPED: Color32 = Color32::from_rgb(160, 160, 172);
    pub const STATUS_ERROR: Color32 = Color32::from_rgb(231, 76, 60);
}

/// Apply the theme to egui
pub fn apply_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    let mut visuals = Visuals::dark();

    visuals.window_fill = ThemeColors::BG_MEDIUM;
    visuals.panel_fill = ThemeColors::BG_DARK;
    visuals.faint_bg_color = ThemeColors::BG_LIGHT;
    visuals.extreme_bg_color = ThemeColors::BG_DARK;

    let rounding = Rounding::same(6.0);
    for (widget, fill, text) in [
        (&mut visuals.widgets.noninteractive, ThemeColors::BG_MEDIUM, ThemeColors::TEXT_SECONDARY),
        (&mut visuals.widgets.inactive, ThemeColors::BG_LIGHT, ThemeColors::TEXT_PRIMARY),
        (&mut visuals.widgets.hovered, ThemeColors::BG_HOVER, ThemeColors::TEXT_PRIMARY),
        (&mut visuals.widgets.active, ThemeColors::ACCENT_PRIMARY, ThemeColors::TEXT_PRIMARY),
        (&mut visuals.widgets.open, ThemeColors::BG_HOVER, ThemeColors::TEXT_PRIMARY),
    ] {
        widget.bg_fill = fill;
        widget.fg_stroke = Stroke::new(1.0, text);
        widget.rounding = rounding;
    }

    visuals.selection.bg_fill = color_with_alpha(ThemeColors::ACCENT_PRIMARY, 77);
    visuals.selection.stroke = Stroke::new(1.0, ThemeColors::ACCENT_PRIMARY);
    visuals.window_rounding = Rounding::same(8.0);
    visuals.window_stroke = Stroke::new(1.0, ThemeColors::BORDER);
    style.visuals = visuals;

    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.button_padding = egui::vec2(12.0, 6.0);

    style.text_styles = [
        (TextStyle::Small, FontId::new(12.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(15.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(14.0, FontFamily::Monospace)),
        (TextStyle::Button, FontId::new(15.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(20.0, FontFamily::Proportional)),
    ]
    .into();

    ctx.set_style(style);
}

/// Helper to create a color with modified alpha
pub fn color_with_alpha(color: Color32, alpha: u8) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), alpha)
}
