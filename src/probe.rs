//! Detects files that are still being written by the scanning device.

use std::fs::File;
use std::path::Path;

use fs2::FileExt;

/// Outcome of a lock probe.
#[derive(Debug)]
pub enum LockState {
    /// Exclusive access granted; the file is stable.
    Ready,
    /// Another handle holds the file, or it could not be opened.
    Locked(std::io::Error),
}

impl LockState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LockState::Ready)
    }
}

/// Try to take an exclusive lock on `path` without blocking.
///
/// The lock is released again before returning; a successful probe only says
/// the writer has let go of the file.
pub fn probe(path: &Path) -> LockState {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return LockState::Locked(e),
    };
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            LockState::Ready
        }
        Err(e) => LockState::Locked(e),
    }
}
