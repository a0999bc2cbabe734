//! Job records and the types that flow between the stores and the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

/// Longest display name accepted on submission, in bytes.
pub const MAX_DISPLAY_NAME_LEN: usize = 255;

/// Largest declared size that fits the store's signed 64-bit column.
pub const MAX_DECLARED_SIZE: u64 = i64::MAX as u64;

/// Lifecycle status of a job.
///
/// `Queued -> Processing -> Completed | Failed`, plus `Processing -> Queued`
/// when the recovery sweeper reclaims an abandoned job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs carry an outcome.
    pub fn is_resolved(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// What kind of attachment the submitter sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    #[default]
    Document,
    Photo,
    Video,
    Audio,
}

impl ContentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentCategory::Document => "document",
            ContentCategory::Photo => "photo",
            ContentCategory::Video => "video",
            ContentCategory::Audio => "audio",
        }
    }

    /// Name used when the submission carried none.
    pub fn default_file_name(self, source_file_ref: &str) -> String {
        match self {
            ContentCategory::Document => "unknown_file".to_string(),
            ContentCategory::Photo => format!("photo_{}.jpg", source_file_ref),
            ContentCategory::Video => format!("video_{}.mp4", source_file_ref),
            ContentCategory::Audio => format!("audio_{}.mp3", source_file_ref),
        }
    }
}

impl FromStr for ContentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(ContentCategory::Document),
            "photo" => Ok(ContentCategory::Photo),
            "video" => Ok(ContentCategory::Video),
            "audio" => Ok(ContentCategory::Audio),
            other => Err(format!("unknown content category '{}'", other)),
        }
    }
}

/// A submission as received from the front-end, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub source_file_ref: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub declared_size: Option<u64>,
    #[serde(default)]
    pub category: ContentCategory,
    pub submitter_id: i64,
    pub message_ref: i64,
    #[serde(default)]
    pub note: Option<String>,
}

impl JobDescriptor {
    pub fn new(source_file_ref: impl Into<String>, submitter_id: i64, message_ref: i64) -> Self {
        Self {
            source_file_ref: source_file_ref.into(),
            display_name: None,
            declared_size: None,
            category: ContentCategory::Document,
            submitter_id,
            message_ref,
            note: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.declared_size = Some(bytes);
        self
    }

    pub fn with_category(mut self, category: ContentCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The name the file will be uploaded under.
    pub fn resolved_name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.category.default_file_name(&self.source_file_ref),
        }
    }

    /// Rejects descriptors that must never reach the job store.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.source_file_ref.trim().is_empty() {
            return Err(SubmissionError::EmptyReference);
        }
        if has_forbidden_chars(&self.source_file_ref) {
            return Err(SubmissionError::InvalidCharacters {
                field: "source file reference",
            });
        }

        let name = self.resolved_name();
        if has_forbidden_chars(&name) {
            return Err(SubmissionError::InvalidCharacters {
                field: "display name",
            });
        }
        if name.len() > MAX_DISPLAY_NAME_LEN {
            return Err(SubmissionError::NameTooLong {
                len: name.len(),
                max: MAX_DISPLAY_NAME_LEN,
            });
        }

        if let Some(size) = self.declared_size.filter(|&s| s > MAX_DECLARED_SIZE) {
            return Err(SubmissionError::SizeTooLarge {
                size,
                max: MAX_DECLARED_SIZE,
            });
        }

        Ok(())
    }
}

fn has_forbidden_chars(value: &str) -> bool {
    value
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
}

/// A stored job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub source_file_ref: String,
    pub display_name: String,
    pub declared_size: u64,
    pub category: ContentCategory,
    pub submitter_id: i64,
    pub message_ref: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: JobStatus,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether the attempt ceiling still allows another claim.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// How a worker finished a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Uploaded { location: String },
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Uploaded { .. })
    }
}

/// Point-in-time job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Per-submitter upload counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitterStats {
    pub submitter_id: i64,
    pub total_submitted: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_upload_at: Option<DateTime<Utc>>,
}

impl SubmitterStats {
    pub fn empty(submitter_id: i64) -> Self {
        Self {
            submitter_id,
            total_submitted: 0,
            total_succeeded: 0,
            total_failed: 0,
            total_bytes: 0,
            last_upload_at: None,
        }
    }
}

/// Formats a byte count as `"<n.nn> <unit>"`, capped at GB.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}
