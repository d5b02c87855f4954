//! Knowledge-source endpoints: uploaded files and manual entries.

use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::client::{ApiClient, ApiError, ApiResponse, ApiResult, ErrorKind, FilePart, ProgressCallback, RequestOptions};

/// Knowledge-source operations.
#[derive(Debug, Clone)]
pub struct SourceService {
    client: ApiClient,
}

impl SourceService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// List uploaded files, optionally restricted to one section.
    pub async fn list_files(&self, section: Option<&str>) -> ApiResult<ApiResponse<Value>> {
        let mut options = RequestOptions::default();
        if let Some(section) = section {
            options = options.query("section", section);
        }
        self.client.get_with("/user-files", options).await
    }

    /// Upload a file from disk.
    pub async fn upload_file(&self, path: &Path, progress: Option<ProgressCallback>) -> ApiResult<ApiResponse<Value>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ApiError {
            status: 400,
            message: format!("cannot read {}: {}", path.display(), e),
            kind: ErrorKind::Client,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut part = FilePart::new(file_name, bytes);
        if let Some(progress) = progress {
            part = part.on_progress(progress);
        }
        self.upload(part).await
    }

    /// Upload an in-memory file.
    pub async fn upload(&self, part: FilePart) -> ApiResult<ApiResponse<Value>> {
        self.client.upload_file("/upload/file", part).await
    }

    /// Submit free-form text to be indexed.
    pub async fn upload_manual<B: Serialize + ?Sized>(&self, entry: &B) -> ApiResult<ApiResponse<Value>> {
        self.client.post("/upload/manual", entry).await
    }

    /// Delete a file and its derived embeddings. Expects 204 No Content.
    pub async fn delete_file(&self, file_id: u64) -> ApiResult<()> {
        self.client
            .delete::<Value>(&format!("/user-files/{}", file_id))
            .await
            .map(|_| ())
    }

    pub async fn delete_manual_entry(&self, entry_id: u64) -> ApiResult<()> {
        self.client
            .delete::<Value>(&format!("/manual-entries/{}", entry_id))
            .await
            .map(|_| ())
    }
}
