use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpqueueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// A job descriptor that can never be stored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("source file reference is empty")]
    EmptyReference,

    #[error("{field} contains a path separator or control character")]
    InvalidCharacters { field: &'static str },

    #[error("display name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("declared size is {size} bytes, limit is {max}")]
    SizeTooLarge { size: u64, max: u64 },
}

#[derive(Error, Debug)]
pub enum UploadError {
    /// Network or service trouble; the job is recorded failed, never retried in place.
    #[error("{0}")]
    Transient(String),

    /// The hosting service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to read source file '{reference}': {reason}")]
    Source { reference: String, reason: String },

    #[error("Invalid upload URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Uploader panicked: {0}")]
    Panicked(String),
}

impl UploadError {
    /// The hosting service refused the file; sending it again will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadError::Rejected { .. } | UploadError::InvalidUrl { .. })
    }
}

#[derive(Error, Debug)]
#[error("Notification to submitter {submitter_id} failed: {reason}")]
pub struct NotifyError {
    pub submitter_id: i64,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, UpqueueError>;
