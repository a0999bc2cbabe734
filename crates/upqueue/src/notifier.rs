//! Submitter notifications.
//!
//! Delivery is best-effort: the engine logs a failed notification and moves
//! on, it never changes a job's outcome.

use async_trait::async_trait;
use tracing::info;

use crate::error::NotifyError;

/// Delivers a status message to a submitter, in reply to their message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, submitter_id: i64, message_ref: i64, text: &str) -> Result<(), NotifyError>;
}

pub fn upload_started_text() -> String {
    "Starting upload...".to_string()
}

pub fn upload_succeeded_text(name: &str, location: &str, size: &str) -> String {
    format!(
        "Upload successful!\nFile: {}\nDownload URL: {}\nSize: {}",
        name, location, size
    )
}

pub fn upload_failed_text(error: &str) -> String {
    format!("Upload failed: {}", error)
}

/// Writes notifications to the log instead of a chat.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, submitter_id: i64, message_ref: i64, text: &str) -> Result<(), NotifyError> {
        info!(submitter_id, message_ref, "{}", text);
        Ok(())
    }
}
