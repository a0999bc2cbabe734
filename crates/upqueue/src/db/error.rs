//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the database directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A job with the same source file reference is already stored.
    #[error("Job for source file '{0}' already exists")]
    DuplicateJob(String),

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt value in column '{column}': {reason}")]
    CorruptRow { column: &'static str, reason: String },

    /// A value does not fit the column it is written to.
    #[error("Value {value} is out of range for column '{column}'")]
    OutOfRange { column: &'static str, value: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// The blocking task running the query was cancelled or panicked.
    #[error("Database task failed: {0}")]
    Task(String),
}
