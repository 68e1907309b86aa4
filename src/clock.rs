//! Time source used for every wait and timestamp in the courier.

use std::time::Duration;

use chrono::{DateTime, Local};

/// Sleeps and wall-clock reads go through this trait so the retry, grace and
/// poll delays can be observed in tests without real waiting.
pub trait Clock: Send + Sync {
    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Current local time, used for collision suffixes.
    fn now(&self) -> DateTime<Local>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
