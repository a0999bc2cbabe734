//! HTTP uploader for PUT-style file hosts.
//!
//! Each job is sent as `PUT <upload_base>/<display name>`, with the note
//! base64-encoded into the `note` query parameter. A 200 or 201 is a
//! success; the location is the `url` field of a JSON body, or the body
//! itself when it is not JSON.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::{FileSource, UploadReceipt, Uploader};
use crate::error::UploadError;
use crate::job::{format_size, Job};

/// Connection settings for [`HttpUploader`].
#[derive(Debug)]
pub struct HttpUploaderConfig {
    pub upload_base: String,
    pub api_key: Option<SecretString>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl HttpUploaderConfig {
    pub fn new(upload_base: impl Into<String>) -> Self {
        Self {
            upload_base: upload_base.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

pub struct HttpUploader {
    client: Client,
    config: HttpUploaderConfig,
    source: Arc<dyn FileSource>,
    closed: AtomicBool,
}

impl HttpUploader {
    pub fn new(config: HttpUploaderConfig, source: Arc<dyn FileSource>) -> Result<Self, UploadError> {
        // Fail at construction rather than on every job.
        upload_url(&config.upload_base, "index", None)?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UploadError::Transient(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            source,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, job: &Job) -> Result<UploadReceipt, UploadError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(UploadError::Transient("uploader is closed".to_string()));
        }

        let bytes = self.source.fetch(&job.source_file_ref).await?;
        let size = bytes.len() as u64;
        let url = upload_url(
            &self.config.upload_base,
            &job.display_name,
            job.note.as_deref(),
        )?;

        debug!(url = %url, bytes = size, "Uploading file");

        let mut request = self.client.put(url).body(bytes);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::Transient(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Transient(format!("Failed to read upload response: {}", e)))?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(UploadReceipt {
            location: location_from_body(&body),
            size_formatted: format_size(size),
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("HTTP uploader closed");
        }
    }
}

/// `<base>/<name>`, plus `?note=<base64>` for a non-empty note.
fn upload_url(base: &str, name: &str, note: Option<&str>) -> Result<Url, UploadError> {
    let invalid = |reason: String| UploadError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("URL cannot have a path".to_string()))?
        .pop_if_empty()
        .push(name);

    if let Some(note) = note.filter(|n| !n.is_empty()) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(note.as_bytes());
        url.query_pairs_mut().append_pair("note", &encoded);
    }

    Ok(url)
}

fn location_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("url").and_then(|u| u.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
