//! Document store for generated reports.

use async_trait::async_trait;
use serde::Deserialize;

/// Upload failures. Callers log and swallow them.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("document upload is not configured")]
    Disabled,

    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("document store answered {0}")]
    Status(reqwest::StatusCode),
}

/// Archive a CSV document and return where it can be viewed.
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn upload_csv(&self, content: &str, filename: &str) -> Result<String, UploadError>;
}

/// Used when `DOCUMENT_UPLOAD_URL` is not set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUploader;

#[async_trait]
impl DocumentUploader for DisabledUploader {
    async fn upload_csv(&self, _content: &str, filename: &str) -> Result<String, UploadError> {
        tracing::debug!(filename, "Document upload disabled, dropping report");
        Err(UploadError::Disabled)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Posts the CSV body to an HTTP document store.
///
/// The store receives `POST {endpoint}?name={filename}` with a `text/csv`
/// body and answers `{"url": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpDocumentUploader {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDocumentUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentUploader for HttpDocumentUploader {
    async fn upload_csv(&self, content: &str, filename: &str) -> Result<String, UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("name", filename)])
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(content.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status));
        }

        let body: UploadResponse = response.json().await?;
        Ok(body.url)
    }
}
