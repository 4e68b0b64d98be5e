//! Attachment relay: move photo bytes from the chat API into durable object
//! storage and hand back a stable internal reference.
//!
//! Relay failures are isolated per message. The poller archives the photo row
//! first and patches the reference in afterwards, so a storage outage costs
//! the attachment, never the message.

use serde::Deserialize;

use crate::telegram::{TelegramError, UpdateSource};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Telegram: {0}")]
    Telegram(#[from] TelegramError),

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Durable object storage as the relay sees it: issue an upload URL, push
/// bytes, resolve a reference back to a download URL.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn generate_upload_url(&self) -> Result<String, RelayError>;

    /// Upload bytes to a previously issued URL; returns the storage id.
    async fn upload(
        &self,
        url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RelayError>;

    async fn get_url(&self, storage_id: &str) -> Result<String, RelayError>;
}

/// Relay one attachment: resolve and download from the chat API, upload to
/// durable storage, return the internal reference.
pub async fn relay_photo(
    source: &dyn UpdateSource,
    store: &dyn ObjectStore,
    file_id: &str,
) -> Result<String, RelayError> {
    let bytes = source.fetch_attachment(file_id).await?;
    let upload_url = store.generate_upload_url().await?;
    let storage_id = store.upload(&upload_url, bytes, "image/jpeg").await?;
    log::debug!("Relayed attachment {} -> {}", file_id, storage_id);
    Ok(storage_id)
}

// ============================================================================
// HTTP-backed store
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    storage_id: String,
}

#[derive(Debug, Deserialize)]
struct GetUrlResponse {
    url: String,
}

/// Object store backed by an HTTP storage service.
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn generate_upload_url(&self) -> Result<String, RelayError> {
        let resp = self
            .http
            .post(format!("{}/upload-url", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RelayError::Storage(format!(
                "upload-url request failed: HTTP {}",
                resp.status()
            )));
        }
        let body: UploadUrlResponse = resp.json().await?;
        Ok(body.upload_url)
    }

    async fn upload(
        &self,
        url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, RelayError> {
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RelayError::Storage(format!(
                "upload failed: HTTP {}",
                resp.status()
            )));
        }
        let body: UploadResponse = resp.json().await?;
        Ok(body.storage_id)
    }

    async fn get_url(&self, storage_id: &str) -> Result<String, RelayError> {
        let resp = self
            .http
            .get(format!("{}/files/{}/url", self.base_url, storage_id))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RelayError::Storage(format!(
                "get-url failed: HTTP {}",
                resp.status()
            )));
        }
        let body: GetUrlResponse = resp.json().await?;
        Ok(body.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url_response_parses_camel_case() {
        let body: UploadUrlResponse =
            serde_json::from_str(r#"{"uploadUrl": "https://store.example.com/u/1"}"#).unwrap();
        assert_eq!(body.upload_url, "https://store.example.com/u/1");
    }

    #[test]
    fn test_upload_response_parses_storage_id() {
        let body: UploadResponse =
            serde_json::from_str(r#"{"storageId": "st_abc123"}"#).unwrap();
        assert_eq!(body.storage_id, "st_abc123");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = HttpObjectStore::new("https://store.example.com/");
        assert_eq!(store.base_url, "https://store.example.com");
    }
}
