mod app;
mod clipboard;
pub mod config;
pub mod device;
pub mod identity;
pub mod position;
pub mod session;
pub mod store;
pub mod tracker;
mod ui;
pub mod viewer;
mod wake_lock;

use app::BagTrackApp;
use config::AppConfig;
use identity::spawn_sign_in;

pub fn run() -> eframe::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("BagTrack starting up...");

    let config = AppConfig::from_env();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    let identity_rx = spawn_sign_in(runtime.handle(), config.clone());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_min_inner_size([360.0, 480.0])
            .with_title("BagTrack Live"),
        ..Default::default()
    };

    eframe::run_native(
        "BagTrack Live",
        options,
        Box::new(move |_cc| Ok(Box::new(BagTrackApp::new(runtime, config, identity_rx)))),
    )
}
