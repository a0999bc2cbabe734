pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod job;
pub mod notifier;
pub mod secrets;
pub mod store;
pub mod sweeper;
pub mod uploader;

pub use config::{load_config, load_config_from_str, Config};
pub use db::{Database, DatabaseError};
pub use engine::{EngineConfig, EngineState, QueueEngine};
pub use error::{
    ConfigError, NotifyError, Result, SubmissionError, UploadError, UpqueueError,
};
pub use job::{
    format_size, ContentCategory, Job, JobDescriptor, JobOutcome, JobStatus, StatusCounts,
    SubmitterStats,
};
pub use notifier::{LogNotifier, Notifier};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{JobStore, SqliteJobStore, SqliteStatsStore, StatsStore};
pub use sweeper::RecoverySweeper;
pub use uploader::{
    FileSource, HttpUploader, HttpUploaderConfig, LocalFileSource, UploadReceipt, Uploader,
};
