//! # E-Paper Message Board Entry Point
//!
//! Loads the configuration, picks a panel, shows the QR boot screen and then serves
//! the message form until the process is stopped. It supports both production mode
//! (SPI e-paper panel, `hardware` feature on Linux) and development mode (`--stdout`,
//! frames printed to the terminal).

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod hardware;

use anyhow::Context;
use epaper_message::app::{self, App};
use epaper_message::canvas::Screen;
use epaper_message::config::Config;
use epaper_message::epd::{FrameBuffer, Panel, Rotation};
use epaper_message::renderer::{AsciiPanel, QrScreen};
use epaper_message::settings::SettingsStore;
use epaper_message::web;
use std::env;
use std::future::IntoFuture;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Requests waiting for the control loop before handlers start to queue.
const REQUEST_QUEUE: usize = 16;

fn init_tracing() {
    // Honors RUST_LOG if present
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Value following `--config`, if given.
fn config_path(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn open_panel(config: &Config, development_mode: bool) -> anyhow::Result<Box<dyn Panel>> {
    if development_mode {
        info!("development mode: printing frames to the terminal");
        return Ok(Box::new(AsciiPanel::stdout()));
    }

    #[cfg(all(target_os = "linux", feature = "hardware"))]
    let panel: Box<dyn Panel> =
        Box::new(hardware::open_panel(&config.display).context("e-paper panel unavailable")?);

    #[cfg(not(all(target_os = "linux", feature = "hardware")))]
    let panel: Box<dyn Panel> = {
        warn!(
            width = config.display.width,
            height = config.display.height,
            "e-paper support not enabled (rebuild on Linux with --features hardware), \
             printing frames to the terminal instead"
        );
        Box::new(AsciiPanel::stdout())
    };

    Ok(panel)
}

async fn serve(config: Config, panel: Box<dyn Panel>) -> anyhow::Result<()> {
    let display = &config.display;
    let access_point = &config.access_point;

    let frame = FrameBuffer::new(
        display.width,
        display.height,
        Rotation::from_quarter_turns(display.rotation),
    );
    let qr = QrScreen::new(
        &access_point.ssid,
        &access_point.password,
        access_point.address,
        display.qr_target_size,
    );
    let store = SettingsStore::new(&config.storage.settings_path);

    let mut app = App::new(
        Screen::new(frame, panel),
        store,
        qr,
        display.qr_duration(),
        Instant::now(),
    );
    app.boot();

    let listener = TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("bind {}", config.server.listen))?;
    info!(
        ssid = %access_point.ssid,
        url = %format!("http://{}", access_point.address),
        listen = %config.server.listen,
        "web server started"
    );

    let (requests, inbox) = mpsc::channel(REQUEST_QUEUE);
    tokio::select! {
        result = axum::serve(listener, web::router(requests)).into_future() => {
            result.context("HTTP server failed")?;
        }
        _ = app::run(app, inbox) => warn!("control loop stopped"),
    }
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    init_tracing();

    // Development mode: render to stdout for testing without hardware
    let args: Vec<String> = env::args().collect();
    let development_mode = args.iter().any(|arg| arg == "--stdout");
    let config = match config_path(&args) {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    let panel = open_panel(&config, development_mode)?;

    // Everything runs on one thread: the control loop owns the display.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("tokio runtime")?;
    rt.block_on(serve(config, panel))
}
