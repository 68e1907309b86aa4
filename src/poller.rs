//! The poll loop.
//!
//! Two logical states: idle between cycles, processing while walking the
//! candidates of one scan. Each cycle is
//!
//! 1. scan the watch directory
//! 2. for each candidate: grace delay, lock probe, upload (or skip if locked)
//! 3. sleep the poll interval
//!
//! Nothing that happens inside a cycle stops the loop: scan errors, per-file
//! errors and panics are logged and the loop moves on to its next sleep.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::clock::Clock;
use crate::probe::{LockState, probe};
use crate::remote::DocumentService;
use crate::scanner::Scanner;
use crate::upload::{UploadEngine, UploadOutcome};

/// Longest single sleep while idling, so shutdown requests are noticed.
const SHUTDOWN_POLL_SLICE: Duration = Duration::from_secs(1);

/// Counters for one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Candidates returned by the scanner.
    pub discovered: usize,
    /// Files accepted by the service.
    pub uploaded: usize,
    /// Files moved to the failure directory.
    pub failed: usize,
    /// Files skipped because they were still locked.
    pub skipped: usize,
    /// Enumeration and per-file errors.
    pub errors: usize,
}

impl CycleReport {
    /// Whether the cycle touched anything worth a summary line.
    pub fn is_quiet(&self) -> bool {
        self.discovered == 0 && self.errors == 0
    }
}

/// Drives repeated scan → probe → upload cycles.
pub struct Poller<S> {
    scanner: Scanner,
    engine: UploadEngine<S>,
    clock: Arc<dyn Clock>,
    site_tag: Option<u64>,
    grace_delay: Duration,
    poll_interval: Duration,
}

impl<S: DocumentService> Poller<S> {
    pub fn new(
        scanner: Scanner,
        engine: UploadEngine<S>,
        clock: Arc<dyn Clock>,
        site_tag: Option<u64>,
    ) -> Self {
        Self {
            scanner,
            engine,
            clock,
            site_tag,
            grace_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(30),
        }
    }

    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn site_tag(&self) -> Option<u64> {
        self.site_tag
    }

    /// Run one full cycle without sleeping afterwards.
    pub fn run_cycle(&self) -> CycleReport {
        self.cycle(&AtomicBool::new(false))
    }

    /// Loop until `shutdown` is set. Returns the number of cycles run.
    ///
    /// The flag is checked between files and during the inter-cycle sleep;
    /// an upload already in progress is allowed to finish.
    pub fn run(&self, shutdown: &AtomicBool) -> u64 {
        tracing::info!(
            "Watching '{}' every {}s",
            self.scanner.watch_dir().display(),
            self.poll_interval.as_secs()
        );
        let mut cycles = 0u64;
        while !shutdown.load(Ordering::SeqCst) {
            match panic::catch_unwind(AssertUnwindSafe(|| self.cycle(shutdown))) {
                Ok(report) => {
                    if !report.is_quiet() {
                        tracing::info!(
                            discovered = report.discovered,
                            uploaded = report.uploaded,
                            failed = report.failed,
                            skipped = report.skipped,
                            errors = report.errors,
                            "cycle finished"
                        );
                    }
                }
                Err(payload) => {
                    tracing::error!(
                        "Unexpected error in poll cycle: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
            cycles += 1;
            self.idle(shutdown);
        }
        tracing::info!("Shutdown requested; stopped after {cycles} cycles");
        cycles
    }

    fn cycle(&self, shutdown: &AtomicBool) -> CycleReport {
        let scan = self.scanner.scan();
        let mut report = CycleReport {
            discovered: scan.files.len(),
            errors: scan.errors.len(),
            ..Default::default()
        };
        for err in &scan.errors {
            tracing::warn!("Scan error: {err}");
        }

        for candidate in &scan.files {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.clock.sleep(self.grace_delay);
            if let LockState::Locked(e) = probe(&candidate.path) {
                tracing::warn!(
                    "'{}' is locked (still being written?), skipping this cycle: {e}",
                    candidate.name
                );
                report.skipped += 1;
                continue;
            }

            match self.engine.upload(&candidate.path, self.site_tag) {
                Ok(UploadOutcome::Archived { .. }) => report.uploaded += 1,
                Ok(UploadOutcome::Failed { .. }) => report.failed += 1,
                Ok(UploadOutcome::Quarantined { .. }) => {
                    report.uploaded += 1;
                    report.errors += 1;
                }
                Err(e) => {
                    tracing::error!("Error processing '{}': {e}", candidate.name);
                    report.errors += 1;
                }
            }
        }

        report
    }

    /// Sleep the poll interval in slices, returning early on shutdown.
    fn idle(&self, shutdown: &AtomicBool) {
        let mut remaining = self.poll_interval;
        while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
            let slice = remaining.min(SHUTDOWN_POLL_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
