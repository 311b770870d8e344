//! Image storage on Google Drive.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::google::{TokenSource, failure_reason};

const DRIVE_BASE_URL: &str = "https://www.googleapis.com";

/// Somewhere to put note images. Returns a URL the page can display.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<String, UploadError>;
}

/// File extension for an accepted image MIME type.
pub fn extension_for(mime: &str) -> Result<&'static str, UploadError> {
    match mime.trim().to_lowercase().as_str() {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => Err(UploadError::UnsupportedType(other.to_string())),
    }
}

/// `{YYYYmmdd_HHMMSS}_{short-id}.{ext}`
pub fn upload_filename(now: &DateTime<FixedOffset>, ext: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}.{ext}", now.format("%Y%m%d_%H%M%S"), &id[..8])
}

pub fn viewer_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=view&id={file_id}")
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

/// Google Drive v3. Files land in one folder and are always made
/// readable by anyone with the link.
pub struct GoogleDrive {
    folder_id: String,
    tokens: Arc<dyn TokenSource>,
    client: reqwest::Client,
    base_url: String,
}

impl GoogleDrive {
    pub fn new(
        folder_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            folder_id: folder_id.into(),
            tokens,
            client,
            base_url: DRIVE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn failed(filename: &str, reason: impl Into<String>) -> UploadError {
        UploadError::Failed {
            filename: filename.to_string(),
            reason: reason.into(),
        }
    }

    async fn check(resp: reqwest::Response, filename: &str) -> Result<reqwest::Response, UploadError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(Self::failed(filename, failure_reason(resp).await))
        }
    }

    /// Fill a freshly created file with the image and open it to link viewers.
    async fn fill_and_share(
        &self,
        file_id: &str,
        auth: &str,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<(), UploadError> {
        let resp = self
            .client
            .patch(format!("{}/upload/drive/v3/files/{file_id}", self.base_url))
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Self::failed(filename, e.to_string()))?;
        Self::check(resp, filename).await?;

        let resp = self
            .client
            .post(format!("{}/drive/v3/files/{file_id}/permissions", self.base_url))
            .query(&[("supportsAllDrives", "true")])
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&serde_json::json!({ "type": "anyone", "role": "reader" }))
            .send()
            .await
            .map_err(|e| Self::failed(filename, e.to_string()))?;
        Self::check(resp, filename).await?;
        Ok(())
    }

    /// Best-effort removal of a half-finished upload.
    async fn discard(&self, file_id: &str, auth: &str, filename: &str) {
        let result = self
            .client
            .delete(format!("{}/drive/v3/files/{file_id}", self.base_url))
            .query(&[("supportsAllDrives", "true")])
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(filename, id = file_id, "Discarded partial upload");
            }
            Ok(resp) => {
                warn!(filename, id = file_id, status = %resp.status(), "Could not discard partial upload");
            }
            Err(e) => {
                warn!(filename, id = file_id, error = %e, "Could not discard partial upload");
            }
        }
    }
}

#[async_trait]
impl FileStore for GoogleDrive {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<String, UploadError> {
        let token = self.tokens.access_token().await?;
        let auth = format!("Bearer {}", token.expose_secret());
        let size = bytes.len();

        // Created named and inside the folder; nothing lands in the account root.
        let resp = self
            .client
            .post(format!("{}/drive/v3/files", self.base_url))
            .query(&[("supportsAllDrives", "true")])
            .header(reqwest::header::AUTHORIZATION, &auth)
            .json(&serde_json::json!({
                "name": filename,
                "parents": [self.folder_id],
                "mimeType": mime,
            }))
            .send()
            .await
            .map_err(|e| Self::failed(filename, e.to_string()))?;
        let file: DriveFile = Self::check(resp, filename)
            .await?
            .json()
            .await
            .map_err(|e| Self::failed(filename, format!("bad create response: {e}")))?;

        if let Err(e) = self.fill_and_share(&file.id, &auth, bytes, mime, filename).await {
            self.discard(&file.id, &auth, filename).await;
            return Err(e);
        }

        info!(filename, id = %file.id, bytes = size, "Image uploaded to Drive");
        Ok(viewer_url(&file.id))
    }
}
