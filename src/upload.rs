//! Upload engine: bounded retries and final relocation.
//!
//! Attempt lifecycle for one file:
//!
//! ```text
//! Attempting(1) ──ok──> Succeeded ──> move to archive
//!      │
//!      └─err─> [sleep retry_delay] ──> Attempting(2) ... Attempting(max)
//!                                                            │
//!                                                            └─err─> Exhausted ──> move to failed
//! ```
//!
//! The retry delay is fixed; there is no backoff growth. An accepted file
//! whose archive move fails is moved to the failure directory instead, so it
//! is never posted twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::clock::Clock;
use crate::relocate::relocate;
use crate::remote::{DocumentService, DocumentUpload, RemoteError};

/// Local failures that keep the engine from finishing a file.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {} to {}: {source}", .path.display(), .dest_dir.display())]
    Relocate {
        path: PathBuf,
        dest_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a file left the watch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Upload accepted; file moved to the archive directory.
    Archived {
        reference: String,
        attempts: u32,
        destination: PathBuf,
    },
    /// All attempts failed; file moved to the failure directory.
    Failed {
        attempts: u32,
        last_error: String,
        destination: PathBuf,
    },
    /// Upload accepted but the archive move failed; file moved to the
    /// failure directory.
    Quarantined {
        reference: String,
        attempts: u32,
        archive_error: String,
        destination: PathBuf,
    },
}

impl UploadOutcome {
    pub fn is_archived(&self) -> bool {
        matches!(self, UploadOutcome::Archived { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            UploadOutcome::Archived { attempts, .. }
            | UploadOutcome::Failed { attempts, .. }
            | UploadOutcome::Quarantined { attempts, .. } => *attempts,
        }
    }

    pub fn destination(&self) -> &Path {
        match self {
            UploadOutcome::Archived { destination, .. }
            | UploadOutcome::Failed { destination, .. }
            | UploadOutcome::Quarantined { destination, .. } => destination,
        }
    }
}

/// Fixed-delay retry bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub delay: Duration,
}

/// Where the attempt state machine goes next.
#[derive(Debug, PartialEq)]
pub enum AttemptState {
    /// About to make attempt `n` (1-based).
    Attempting(u32),
    /// Attempt `attempt` was accepted with `reference`.
    Succeeded { attempt: u32, reference: String },
    /// Wait `delay`, then make attempt `next`.
    Waiting { next: u32, delay: Duration },
    /// Every attempt failed.
    Exhausted { attempts: u32, last_error: String },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Transition out of `Attempting(attempt)` given that attempt's result.
    pub fn transition(&self, attempt: u32, result: Result<String, RemoteError>) -> AttemptState {
        match result {
            Ok(reference) => AttemptState::Succeeded { attempt, reference },
            Err(_) if attempt < self.max_attempts => AttemptState::Waiting {
                next: attempt + 1,
                delay: self.delay,
            },
            Err(err) => AttemptState::Exhausted {
                attempts: attempt,
                last_error: err.to_string(),
            },
        }
    }
}

/// Sends files to the document service and files them away afterwards.
pub struct UploadEngine<S> {
    service: S,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    archive_dir: PathBuf,
    failed_dir: PathBuf,
}

impl<S: DocumentService> UploadEngine<S> {
    pub fn new(
        service: S,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        archive_dir: impl Into<PathBuf>,
        failed_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            clock,
            policy,
            archive_dir: archive_dir.into(),
            failed_dir: failed_dir.into(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Upload `path`, tagged with `tag` when present, then move it to the
    /// archive or failure directory.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Read`] without contacting the service when the
    /// file cannot be read (it stays in place), and [`UploadError::Relocate`]
    /// when the file could not be moved anywhere.
    pub fn upload(&self, path: &Path, tag: Option<u64>) -> Result<UploadOutcome, UploadError> {
        let file_name = display_name(path);
        let content = std::fs::read(path).map_err(|source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document = DocumentUpload {
            file_name: file_name.clone(),
            content,
            tag,
        };

        let max = self.policy.max_attempts;
        let mut state = AttemptState::Attempting(1);
        loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    tracing::info!("Uploading '{file_name}' (attempt {attempt}/{max})...");
                    let result = self.service.post_document(&document);
                    if let Err(e) = &result {
                        tracing::warn!(
                            "Upload attempt {attempt}/{max} for '{file_name}' failed: {e}"
                        );
                    }
                    self.policy.transition(attempt, result)
                }
                AttemptState::Waiting { next, delay } => {
                    tracing::info!("Retrying '{file_name}' in {}s...", delay.as_secs());
                    self.clock.sleep(delay);
                    AttemptState::Attempting(next)
                }
                AttemptState::Succeeded { attempt, reference } => {
                    tracing::info!("Successfully uploaded '{file_name}' (Task: {reference})");
                    let archive_error = match self.move_to(path, &self.archive_dir) {
                        Ok(destination) => {
                            tracing::info!(
                                "Archived '{file_name}' to '{}'",
                                destination.display()
                            );
                            return Ok(UploadOutcome::Archived {
                                reference,
                                attempts: attempt,
                                destination,
                            });
                        }
                        Err(e) => e,
                    };
                    tracing::error!(
                        "Uploaded '{file_name}' but could not archive it ({archive_error}); moving it to the failure directory"
                    );
                    let destination = self.move_to(path, &self.failed_dir)?;
                    tracing::warn!("Moved '{file_name}' to '{}'", destination.display());
                    return Ok(UploadOutcome::Quarantined {
                        reference,
                        attempts: attempt,
                        archive_error: archive_error.to_string(),
                        destination,
                    });
                }
                AttemptState::Exhausted {
                    attempts,
                    last_error,
                } => {
                    tracing::error!(
                        "Failed to upload '{file_name}' after {attempts} attempts ({last_error})"
                    );
                    let destination = self.move_to(path, &self.failed_dir)?;
                    tracing::info!("Moved '{file_name}' to '{}'", destination.display());
                    return Ok(UploadOutcome::Failed {
                        attempts,
                        last_error,
                        destination,
                    });
                }
            };
        }
    }

    fn move_to(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf, UploadError> {
        relocate(path, dest_dir, self.clock.now()).map_err(|source| UploadError::Relocate {
            path: path.to_path_buf(),
            dest_dir: dest_dir.to_path_buf(),
            source,
        })
    }
}

/// File name for log lines.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Local, TimeZone};
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::Mutex;

    struct ScriptedService {
        replies: Mutex<VecDeque<Result<String, RemoteError>>>,
        seen: Mutex<Vec<DocumentUpload>>,
    }

    impl ScriptedService {
        fn new(replies: Vec<Result<String, RemoteError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl DocumentService for ScriptedService {
        fn ping(&self) -> Result<(), RemoteError> {
            Ok(())
        }

        fn find_tag(&self, _name: &str) -> Result<Option<u64>, RemoteError> {
            Ok(None)
        }

        fn post_document(&self, upload: &DocumentUpload) -> Result<String, RemoteError> {
            self.seen.lock().unwrap().push(upload.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RemoteError::Timeout))
        }
    }

    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Clock for RecordingClock {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }

        fn now(&self) -> DateTime<Local> {
            Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        inbox: PathBuf,
        archive: PathBuf,
        failed: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let inbox = tmp.path().join("in");
        let archive = tmp.path().join("archive");
        let failed = tmp.path().join("failed");
        for dir in [&inbox, &archive, &failed] {
            fs::create_dir_all(dir).unwrap();
        }
        Fixture {
            _tmp: tmp,
            inbox,
            archive,
            failed,
        }
    }

    fn engine(
        fx: &Fixture,
        service: Arc<ScriptedService>,
        clock: Arc<RecordingClock>,
        max: u32,
    ) -> UploadEngine<Arc<ScriptedService>> {
        UploadEngine::new(
            service,
            clock,
            RetryPolicy::new(max, Duration::from_secs(10)),
            &fx.archive,
            &fx.failed,
        )
    }

    #[test]
    fn test_transition_table() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(
            policy.transition(1, Ok("7".into())),
            AttemptState::Succeeded {
                attempt: 1,
                reference: "7".into()
            }
        );
        assert_eq!(
            policy.transition(2, Err(RemoteError::Timeout)),
            AttemptState::Waiting {
                next: 3,
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(
            policy.transition(3, Err(RemoteError::Timeout)),
            AttemptState::Exhausted {
                attempts: 3,
                last_error: "request timed out".into()
            }
        );
    }

    #[test]
    fn test_retry_policy_floor() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_success_on_first_attempt_archives() {
        let fx = fixture();
        let path = fx.inbox.join("scan1.pdf");
        fs::write(&path, b"%PDF-1.7").unwrap();
        let service = ScriptedService::new(vec![Ok("42".into())]);
        let clock = Arc::new(RecordingClock::default());

        let outcome = engine(&fx, service.clone(), clock.clone(), 3)
            .upload(&path, Some(9))
            .unwrap();

        assert!(outcome.is_archived());
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.destination(), fx.archive.join("scan1.pdf"));
        assert!(!path.exists());
        assert_eq!(service.attempts(), 1);
        assert!(clock.sleeps.lock().unwrap().is_empty());

        let seen = service.seen.lock().unwrap();
        assert_eq!(seen[0].file_name, "scan1.pdf");
        assert_eq!(seen[0].content, b"%PDF-1.7");
        assert_eq!(seen[0].tag, Some(9));
    }

    #[test]
    fn test_success_on_third_attempt() {
        let fx = fixture();
        let path = fx.inbox.join("scan2.pdf");
        fs::write(&path, b"x").unwrap();
        let service = ScriptedService::new(vec![
            Err(RemoteError::Network("refused".into())),
            Err(RemoteError::Http {
                status: 503,
                message: "Service Unavailable".into(),
            }),
            Ok("task-3".into()),
        ]);
        let clock = Arc::new(RecordingClock::default());

        let outcome = engine(&fx, service.clone(), clock.clone(), 3)
            .upload(&path, None)
            .unwrap();

        assert!(outcome.is_archived());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(service.attempts(), 3);
        assert_eq!(
            *clock.sleeps.lock().unwrap(),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
        assert!(fx.archive.join("scan2.pdf").exists());
        assert!(!fx.failed.join("scan2.pdf").exists());
    }

    #[test]
    fn test_exhausted_moves_to_failed() {
        let fx = fixture();
        let path = fx.inbox.join("bad.pdf");
        fs::write(&path, b"x").unwrap();
        let service = ScriptedService::new(vec![]);
        let clock = Arc::new(RecordingClock::default());

        let outcome = engine(&fx, service.clone(), clock.clone(), 4)
            .upload(&path, None)
            .unwrap();

        assert!(!outcome.is_archived());
        assert_eq!(outcome.attempts(), 4);
        assert_eq!(service.attempts(), 4);
        assert_eq!(clock.sleeps.lock().unwrap().len(), 3);
        assert!(fx.failed.join("bad.pdf").exists());
        assert!(!fx.archive.join("bad.pdf").exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_unreadable_file_is_not_uploaded() {
        let fx = fixture();
        let service = ScriptedService::new(vec![Ok("1".into())]);
        let clock = Arc::new(RecordingClock::default());

        let err = engine(&fx, service.clone(), clock, 3)
            .upload(&fx.inbox.join("vanished.pdf"), None)
            .unwrap_err();

        assert!(matches!(err, UploadError::Read { .. }));
        assert_eq!(service.attempts(), 0);
    }

    #[test]
    fn test_archive_failure_falls_back_to_failed_dir() {
        let fx = fixture();
        let path = fx.inbox.join("scan.pdf");
        fs::write(&path, b"x").unwrap();
        fs::remove_dir_all(&fx.archive).unwrap();
        fs::write(&fx.archive, b"not a directory").unwrap();
        let service = ScriptedService::new(vec![Ok("1".into())]);
        let clock = Arc::new(RecordingClock::default());

        let outcome = engine(&fx, service.clone(), clock, 3)
            .upload(&path, None)
            .unwrap();

        assert!(matches!(
            &outcome,
            UploadOutcome::Quarantined { reference, attempts: 1, .. } if reference == "1"
        ));
        assert_eq!(outcome.destination(), fx.failed.join("scan.pdf"));
        assert!(!path.exists());
        assert_eq!(service.attempts(), 1);
    }

    #[test]
    fn test_relocate_failure_is_reported_when_both_moves_fail() {
        let fx = fixture();
        let path = fx.inbox.join("scan.pdf");
        fs::write(&path, b"x").unwrap();
        fs::remove_dir_all(&fx.archive).unwrap();
        fs::remove_dir_all(&fx.failed).unwrap();
        let service = ScriptedService::new(vec![Ok("1".into())]);
        let clock = Arc::new(RecordingClock::default());

        let err = engine(&fx, service, clock, 3)
            .upload(&path, None)
            .unwrap_err();

        assert!(matches!(
            &err,
            UploadError::Relocate { dest_dir, .. } if *dest_dir == fx.failed
        ));
        assert!(path.exists());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("/in/scan1.pdf")), "scan1.pdf");
    }
}
