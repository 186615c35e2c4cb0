//! Dashboard application entry point

use eframe::egui;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use crate::app::IndicatorApp;
use crate::dashboard::theme;
use crate::dashboard::views::render_home_view;
use crate::overlay::viewport::show_surfaces;
use crate::overlay::widgets::IndicatorStyle;
use crate::shared::SharedAppState;

/// How often the status panel refreshes when nothing else repaints it
const STATUS_REFRESH: Duration = Duration::from_millis(250);

/// The status window. Owns the host so the runtime lives as long as the UI.
pub struct DashboardApp {
    host: IndicatorApp,
    shared_state: Arc<RwLock<SharedAppState>>,
    indicator_style: IndicatorStyle,
    theme_applied: bool,
}

impl DashboardApp {
    pub fn new(host: IndicatorApp) -> Self {
        let shared_state = host.state();
        Self {
            host,
            shared_state,
            indicator_style: IndicatorStyle::default(),
            theme_applied: false,
        }
    }

    /// Create eframe options for the status window
    pub fn options() -> eframe::NativeOptions {
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([560.0, 300.0])
                .with_min_inner_size([480.0, 260.0])
                .with_title("OBS Live Indicator"),
            ..Default::default()
        }
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            theme::apply_theme(ctx);
            self.theme_applied = true;
        }

        if let Some(topology) = self.host.viewport_topology() {
            ctx.input(|i| topology.report_from_viewport(i.viewport()));
        }

        self.host.process_commands();

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none().inner_margin(16.0).show(ui, |ui| {
                render_home_view(ui, &self.shared_state);
            });
        });

        show_surfaces(ctx, self.host.registry(), &self.indicator_style);

        ctx.request_repaint_after(STATUS_REFRESH);
    }
}

/// Run the status window until it is closed, then shut the host down
pub fn run_dashboard(host: IndicatorApp) -> Result<(), eframe::Error> {
    host.start();
    let app = DashboardApp::new(host);
    eframe::run_native(
        "OBS Live Indicator",
        DashboardApp::options(),
        Box::new(|_cc| Ok(Box::new(app))),
    )
}
