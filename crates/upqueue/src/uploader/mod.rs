//! Uploader client: moves one job's bytes to the hosting service.

use async_trait::async_trait;

use crate::error::UploadError;
use crate::job::Job;

pub mod http;
pub mod source;

pub use http::{HttpUploader, HttpUploaderConfig};
pub use source::{FileSource, LocalFileSource};

/// What the hosting service reported for a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Where the file can be fetched from.
    pub location: String,
    /// Human-readable size of the bytes actually sent.
    pub size_formatted: String,
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, job: &Job) -> Result<UploadReceipt, UploadError>;

    /// Releases client resources. Called once when the engine loop exits.
    async fn close(&self) {}
}
