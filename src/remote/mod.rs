//! Remote document service.
//!
//! The courier only needs three calls from the service:
//!
//! - `GET /api/` to check that it is reachable
//! - `GET /api/tags/?name__iexact=<name>` to resolve the site tag
//! - `POST /api/documents/post_document/` to hand over a scanned file
//!
//! [`DocumentService`] is the seam between the upload logic and HTTP; the
//! production implementation is [`client::HttpDocumentService`].

pub mod client;

use std::sync::Arc;

use thiserror::Error;

pub use client::HttpDocumentService;

/// Errors talking to the document service.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::UnexpectedResponse(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// A document ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    /// Original filename, preserved in the multipart part.
    pub file_name: String,
    /// Full file content.
    pub content: Vec<u8>,
    /// Site tag identifier, sent as the `tags` field when present.
    pub tag: Option<u64>,
}

/// Operations the courier needs from the document service.
pub trait DocumentService {
    /// Lightweight authenticated request against the API root.
    fn ping(&self) -> Result<(), RemoteError>;

    /// Look up a tag by case-insensitive exact name. Returns the first
    /// match's id, or `None` when no tag has that name.
    fn find_tag(&self, name: &str) -> Result<Option<u64>, RemoteError>;

    /// Post one document. Returns the task/document reference the service
    /// echoes back.
    fn post_document(&self, upload: &DocumentUpload) -> Result<String, RemoteError>;
}

impl<T: DocumentService + ?Sized> DocumentService for Arc<T> {
    fn ping(&self) -> Result<(), RemoteError> {
        (**self).ping()
    }

    fn find_tag(&self, name: &str) -> Result<Option<u64>, RemoteError> {
        (**self).find_tag(name)
    }

    fn post_document(&self, upload: &DocumentUpload) -> Result<String, RemoteError> {
        (**self).post_document(upload)
    }
}
