//! Watch directory enumeration.
//!
//! The immediate children of the watch directory are listed once per scan and
//! kept when their extension matches a configured one, ignoring ASCII case.
//! Errors are collected per entry instead of aborting the scan, so callers can
//! tell "nothing to do" apart from "could not look".

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Errors hit while enumerating the watch directory.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Watch directory {} unavailable: {source}", .path.display())]
    WatchDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unreadable entry {}: {message}", .path.display())]
    UnreadableEntry { path: PathBuf, message: String },
}

/// A file seen during one scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// File name including extension.
    pub name: String,
    /// Extension as found on disk (original case).
    pub extension: String,
}

impl CandidateFile {
    /// Build a candidate from a path. Returns `None` for paths without a
    /// UTF-8 file name or extension.
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let extension = path.extension()?.to_str()?.to_string();
        Some(Self {
            path,
            name,
            extension,
        })
    }
}

/// Result of one enumeration pass.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Matching files in discovery order.
    pub files: Vec<CandidateFile>,
    /// Entries that could not be read or named; they contributed no files.
    pub errors: Vec<ScanError>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Lists candidate files in a single directory.
#[derive(Debug, Clone)]
pub struct Scanner {
    watch_dir: PathBuf,
    extensions: Vec<String>,
}

impl Scanner {
    pub fn new(watch_dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            extensions: extensions.to_vec(),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Enumerate matching regular files directly inside the watch directory.
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        match std::fs::metadata(&self.watch_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                report
                    .errors
                    .push(ScanError::NotADirectory(self.watch_dir.clone()));
                return report;
            }
            Err(source) => {
                report.errors.push(ScanError::WatchDirUnavailable {
                    path: self.watch_dir.clone(),
                    source,
                });
                return report;
            }
        }

        let entries = WalkDir::new(&self.watch_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true);

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.watch_dir.clone());
                    report.errors.push(ScanError::UnreadableEntry {
                        path,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file()
                || entry.file_name().as_encoded_bytes().starts_with(b".")
                || !self.wants(entry.path())
            {
                continue;
            }

            let path = entry.into_path();
            match CandidateFile::from_path(path.clone()) {
                Some(candidate) => report.files.push(candidate),
                None => report.errors.push(ScanError::UnreadableEntry {
                    path,
                    message: "file name is not valid UTF-8".to_string(),
                }),
            }
        }

        report
    }
}
