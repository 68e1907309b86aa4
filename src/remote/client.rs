//! Blocking HTTP implementation of [`DocumentService`].

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;

use super::{DocumentService, DocumentUpload, RemoteError};

/// Timeout for the startup liveness probe.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the tag lookup.
pub const TAG_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single document upload.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Multipart field carrying the file.
pub const DOCUMENT_FIELD: &str = "document";

/// Multipart field carrying the numeric tag id.
pub const TAGS_FIELD: &str = "tags";

/// Paged collection returned by `GET /api/tags/`.
#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    results: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    id: u64,
}

/// Document service reached over HTTP with token authentication.
pub struct HttpDocumentService {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpDocumentService {
    /// Create a client for `base_url` (e.g. `http://paperless:8000`).
    pub fn new(base_url: &str, token: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("scan-courier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Token {}", self.token))
    }
}

impl DocumentService for HttpDocumentService {
    fn ping(&self) -> Result<(), RemoteError> {
        let response = self
            .authorized(self.client.get(self.endpoint("/api/")))
            .timeout(PING_TIMEOUT)
            .send()?;
        ensure_success(response).map(|_| ())
    }

    fn find_tag(&self, name: &str) -> Result<Option<u64>, RemoteError> {
        let response = self
            .authorized(self.client.get(self.endpoint("/api/tags/")))
            .query(&[("name__iexact", name)])
            .timeout(TAG_LOOKUP_TIMEOUT)
            .send()?;
        let page: TagPage = ensure_success(response)?.json()?;
        tracing::debug!(name, count = page.count, "tag lookup finished");
        Ok(page.results.first().map(|tag| tag.id))
    }

    fn post_document(&self, upload: &DocumentUpload) -> Result<String, RemoteError> {
        let response = self
            .authorized(self.client.post(self.endpoint("/api/documents/post_document/")))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(document_form(upload)?)
            .send()?;
        let text = ensure_success(response)?.text()?;
        parse_task_reference(&text)
    }
}

/// Build the `post_document` form. Each call gets a fresh boundary.
fn document_form(upload: &DocumentUpload) -> Result<Form, RemoteError> {
    let file = Part::bytes(upload.content.clone())
        .file_name(upload.file_name.clone())
        .mime_str("application/octet-stream")?;
    let form = Form::new().part(DOCUMENT_FIELD, file);
    Ok(match upload.tag {
        Some(id) => form.text(TAGS_FIELD, id.to_string()),
        None => form,
    })
}

/// Turn non-2xx responses into [`RemoteError::Http`].
fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().unwrap_or_default();
    let detail = detail.trim();
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", truncate(detail, 200))
    };
    Err(RemoteError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Extract the task/document reference from an upload response body.
///
/// Accepts a bare JSON string (task id), a number, or an object carrying
/// `task_id` or `id`.
pub fn parse_task_reference(body: &str) -> Result<String, RemoteError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| RemoteError::UnexpectedResponse(format!("invalid JSON body: {e}")))?;
    let reference = match &value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => ["task_id", "id"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }),
        _ => None,
    };
    reference
        .filter(|r| !r.is_empty())
        .ok_or_else(|| RemoteError::UnexpectedResponse(format!("no task reference in {value}")))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
