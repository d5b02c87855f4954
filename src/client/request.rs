//! Request descriptors and responses.
//!
//! # Responsibilities
//! - Describe a call independently of any single dispatch, so it can be
//!   rebuilt for the post-refresh retry
//! - Carry the token the call was sent with and whether it was retried

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;

use crate::client::upload::{ProgressCallback, UploadProgress};

/// Payload of a request.
#[derive(Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with a single file field.
    File(FilePart),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Json(_) => f.write_str("Json(..)"),
            RequestBody::Form(fields) => write!(f, "Form({} fields)", fields.len()),
            RequestBody::File(part) => write!(f, "File({}, {} bytes)", part.file_name, part.bytes.len()),
        }
    }
}

/// A file to upload.
#[derive(Clone)]
pub struct FilePart {
    /// Multipart field name.
    pub field: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
    /// Whether the total size is announced (enables progress reporting).
    pub length_known: bool,
    pub progress: Option<UploadProgress>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            mime: None,
            bytes,
            length_known: true,
            progress: None,
        }
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn on_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(UploadProgress::new(progress));
        self
    }

    /// Send the file as a chunked stream with no announced size.
    pub fn unknown_length(mut self) -> Self {
        self.length_known = false;
        self
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: reqwest::header::HeaderName, value: reqwest::header::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A call as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the base URL, e.g. "/users/me".
    pub path: String,
    pub options: RequestOptions,
    pub body: RequestBody,
    /// Access token attached at the last dispatch, if any.
    pub sent_token: Option<String>,
    /// Token to use instead of the stored one (set after a refresh).
    pub token_override: Option<String>,
    /// Set once the call has been replayed after a refresh.
    pub retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            options: RequestOptions::default(),
            body: RequestBody::Empty,
            sent_token: None,
            token_override: None,
            retried: false,
        }
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Decoded success response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
}
