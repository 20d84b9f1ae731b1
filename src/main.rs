use anyhow::Result;
use eframe::egui;

mod app;
mod audio;
mod core;
mod messaging;

fn main() -> Result<()> {
    env_logger::init();
    log::info!("starting minitone");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([520.0, 240.0]),
        ..Default::default()
    };

    eframe::run_native(
        "minitone",
        options,
        Box::new(|_cc| {
            let app = match app::SynthApp::new() {
                Ok(app) => app,
                Err(e) => {
                    log::error!("failed to create app: {e:#}");
                    std::process::exit(1);
                }
            };
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow::anyhow!("application error: {e}"))
}
