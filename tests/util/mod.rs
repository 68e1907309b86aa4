#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use scan_courier::clock::Clock;
use scan_courier::poller::Poller;
use scan_courier::remote::{DocumentService, DocumentUpload, RemoteError};
use scan_courier::scanner::Scanner;
use scan_courier::upload::{RetryPolicy, UploadEngine};
use tracing_subscriber::fmt::MakeWriter;

/// In-memory document service.
///
/// Scripted replies are consumed first; after that every post succeeds with
/// an increasing id, except for file names registered with `always_fail`.
pub struct MockService {
    replies: Mutex<VecDeque<Result<String, RemoteError>>>,
    failing: Mutex<HashSet<String>>,
    posts: Mutex<Vec<DocumentUpload>>,
    next_id: AtomicU64,
    tag: Option<u64>,
}

impl MockService {
    pub fn new() -> Arc<Self> {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(replies: Vec<Result<String, RemoteError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            failing: Mutex::new(HashSet::new()),
            posts: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(42),
            tag: None,
        })
    }

    pub fn always_fail(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    pub fn posts(&self) -> Vec<DocumentUpload> {
        self.posts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, file_name: &str) -> usize {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.file_name == file_name)
            .count()
    }
}

impl DocumentService for MockService {
    fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    fn find_tag(&self, _name: &str) -> Result<Option<u64>, RemoteError> {
        Ok(self.tag)
    }

    fn post_document(&self, upload: &DocumentUpload) -> Result<String, RemoteError> {
        self.posts.lock().unwrap().push(upload.clone());
        if self.failing.lock().unwrap().contains(&upload.file_name) {
            return Err(RemoteError::Http {
                status: 500,
                message: "Internal Server Error".into(),
            });
        }
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }
}

/// Clock that records sleeps instead of waiting, with a fixed "now".
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
    now: DateTime<Local>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sleeps: Mutex::new(Vec::new()),
            now: Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn stamp(&self) -> &'static str {
        "20240506_070809"
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    fn now(&self) -> DateTime<Local> {
        self.now
    }
}

pub const RETRY_DELAY: Duration = Duration::from_secs(10);
pub const GRACE_DELAY: Duration = Duration::from_secs(2);

/// Watch/archive/failed directories under one temp root.
pub struct Dirs {
    _tmp: tempfile::TempDir,
    pub watch: PathBuf,
    pub archive: PathBuf,
    pub failed: PathBuf,
}

impl Dirs {
    pub fn new() -> Self {
        let tmp = tempfile::TempDir::new().unwrap();
        let watch = tmp.path().join("watch");
        let archive = tmp.path().join("archive");
        let failed = tmp.path().join("failed");
        for dir in [&watch, &archive, &failed] {
            std::fs::create_dir_all(dir).unwrap();
        }
        Self {
            _tmp: tmp,
            watch,
            archive,
            failed,
        }
    }

    pub fn drop_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.watch.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn extensions() -> Vec<String> {
    ["pdf", "png", "jpg", "jpeg", "tiff", "tif"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

pub fn poller(
    dirs: &Dirs,
    service: Arc<MockService>,
    clock: Arc<ManualClock>,
    max_retries: u32,
    tag: Option<u64>,
) -> Poller<Arc<MockService>> {
    let engine = UploadEngine::new(
        service,
        clock.clone(),
        RetryPolicy::new(max_retries, RETRY_DELAY),
        &dirs.archive,
        &dirs.failed,
    );
    Poller::new(
        Scanner::new(&dirs.watch, &extensions()),
        engine,
        clock,
        tag,
    )
    .with_grace_delay(GRACE_DELAY)
}

/// Shared in-memory sink for captured log output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer.contents())
}
