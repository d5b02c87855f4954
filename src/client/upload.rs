//! Multipart uploads with progress reporting.
//!
//! The file is streamed to reqwest in fixed-size chunks; each chunk pulled
//! by the connection advances the loaded byte count.

use futures_util::stream;
use reqwest::multipart::{Form, Part};
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;

use crate::client::error::{ApiError, ErrorKind};
use crate::client::request::FilePart;

/// Receives the upload percentage (0–100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

const CHUNK_SIZE: usize = 16 * 1024;

/// Progress sink shared by every attempt of the same upload.
///
/// Only values above the highest one already reported are forwarded, so a
/// replay after a token refresh never makes the percentage go backwards.
#[derive(Clone)]
pub struct UploadProgress {
    callback: ProgressCallback,
    last: Arc<AtomicI16>,
}

impl UploadProgress {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            last: Arc::new(AtomicI16::new(-1)),
        }
    }

    /// Report `loaded` of `total` bytes. A zero total counts as unknown.
    pub fn report(&self, loaded: u64, total: u64) {
        let Some(pct) = percent(loaded, total) else {
            return;
        };
        let prev = self.last.fetch_max(i16::from(pct), Ordering::SeqCst);
        if i16::from(pct) > prev {
            (self.callback)(pct);
        }
    }
}

/// `round(loaded * 100 / total)`, clamped to 100.
pub fn percent(loaded: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let loaded = u128::from(loaded.min(total));
    let total = u128::from(total);
    // Round half up in integer arithmetic.
    let pct = (loaded * 200 + total) / (total * 2);
    Some(pct.min(100) as u8)
}

/// Build the multipart form for one dispatch of `part`.
pub(crate) fn build_form(part: &FilePart) -> Result<Form, ApiError> {
    let total = part.bytes.len() as u64;
    let progress = if part.length_known {
        part.progress.clone()
    } else {
        None
    };

    let chunks: Vec<Vec<u8>> = part.bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let mut loaded = 0u64;
    let body = reqwest::Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
        loaded += chunk.len() as u64;
        if let Some(progress) = &progress {
            progress.report(loaded, total);
        }
        Ok::<_, std::io::Error>(chunk)
    })));

    let mut file = if part.length_known {
        Part::stream_with_length(body, total)
    } else {
        Part::stream(body)
    }
    .file_name(part.file_name.clone());

    if let Some(mime) = &part.mime {
        file = file.mime_str(mime).map_err(|e| ApiError {
            status: 400,
            message: format!("invalid content type '{}': {}", mime, e),
            kind: ErrorKind::Client,
        })?;
    }

    Ok(Form::new().part(part.field.clone(), file))
}
