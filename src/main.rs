mod app;
mod backend;
mod cli;
mod error;
mod layout;
mod model;
mod remote;
mod render;
mod state;
mod tokenize;
mod worker;

use clap::Parser;
use eframe::egui;

use app::PatchApp;
use cli::Args;

fn main() {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_filter())
        .parse_default_env()
        .init();

    log::info!("Starting Patchscope Visualizer");
    log::debug!("CLI args: {:?}", args);

    let backend = match args.build_backend() {
        Ok(backend) => backend,
        Err(err) => {
            log::error!("could not set up {:?} backend: {err}", args.backend);
            std::process::exit(1);
        }
    };
    log::info!("Using {} backend", backend.name());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Patchscopes Interactive Visualization")
            .with_inner_size([args.width as f32, args.height as f32]),
        ..Default::default()
    };
    if let Err(err) = eframe::run_native(
        "Patchscope Visualizer",
        options,
        Box::new(|cc| Ok(Box::new(PatchApp::new(cc, backend)))),
    ) {
        log::error!("window closed with error: {err}");
    }
}
