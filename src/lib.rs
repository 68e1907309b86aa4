pub mod clock;
pub mod config;
pub mod logging;
pub mod poller;
pub mod probe;
pub mod relocate;
pub mod remote;
pub mod scanner;
pub mod startup;
pub mod upload;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::poller::Poller;
use crate::remote::HttpDocumentService;
use crate::scanner::Scanner;
use crate::upload::{RetryPolicy, UploadEngine};

/// Library entrypoint: prepare directories, run the startup checks, then poll
/// until `shutdown` is set.
///
/// Blocking; call from a dedicated thread.
pub fn run(config: &Config, shutdown: &AtomicBool) -> Result<()> {
    startup::ensure_dirs(&[config.archive_dir.as_path(), config.failed_dir.as_path()])?;

    tracing::info!(
        service = %config.service_url,
        site = %config.site_name,
        watch_dir = %config.watch_dir.display(),
        "scan-courier starting"
    );

    let service = HttpDocumentService::new(&config.service_url, &config.api_token)
        .context("Failed to build HTTP client")?;
    startup::check_connectivity(&service);
    let site_tag = startup::resolve_site_tag(&service, &config.site_name);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = UploadEngine::new(
        service,
        clock.clone(),
        RetryPolicy::new(config.max_retries, config.retry_delay),
        &config.archive_dir,
        &config.failed_dir,
    );
    let poller = Poller::new(
        Scanner::new(&config.watch_dir, &config.extensions),
        engine,
        clock,
        site_tag,
    )
    .with_grace_delay(config.grace_delay)
    .with_poll_interval(config.poll_interval);

    poller.run(shutdown);
    Ok(())
}
