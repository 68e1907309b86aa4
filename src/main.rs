use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use scan_courier::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    let _log_guard = scan_courier::logging::init(&config.log_file)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received; finishing current file");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    tokio::task::spawn_blocking(move || scan_courier::run(&config, &shutdown))
        .await
        .context("Poll loop thread panicked")?
}
