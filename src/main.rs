// src/main.rs
mod app;
mod capture;
mod driver;
mod error;
mod frame;
mod host;
mod playback;
mod settings;
mod skeleton;
mod ui;

use anyhow::Result;
use eframe::egui;
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let settings = settings::Settings::load();
    let host = host::Host::new(&settings)?;

    // A capture path on the command line is opened straight away
    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        info!("Opening {}", path.display());
        host.read_file(path);
    }

    // Set up GUI options
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([960.0, 640.0]),
        centered: true,
        ..Default::default()
    };

    eframe::run_native(
        "Holistic Viewer",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(create_visuals());
            Box::new(app::ViewerApp::new(cc, settings, host))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Error running application: {}", e))
}

fn create_visuals() -> egui::Visuals {
    let mut visuals = egui::Visuals::dark();

    visuals.widgets.noninteractive.bg_fill = egui::Color32::from_rgb(30, 30, 35);
    visuals.widgets.inactive.bg_fill = egui::Color32::from_rgb(45, 45, 52);
    visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(55, 55, 65);
    visuals.widgets.active.bg_fill = egui::Color32::from_rgb(70, 130, 240);

    visuals.widgets.noninteractive.rounding = egui::Rounding::same(6.0);
    visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
    visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);
    visuals.widgets.active.rounding = egui::Rounding::same(6.0);

    visuals.window_rounding = egui::Rounding::same(10.0);

    visuals
}
