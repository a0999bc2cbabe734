//! Async store interfaces used by the queue engine and the sweeper.
//!
//! The engine only talks to these traits; [`sqlite`] provides the durable
//! implementations on top of the `db` repositories.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::DatabaseError;
use crate::job::{Job, JobDescriptor, JobOutcome, StatusCounts, SubmitterStats};

pub mod sqlite;

pub use sqlite::{SqliteJobStore, SqliteStatsStore};

/// Source of "now" for store writes. Shared so tests can move time forward.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Durable job collection: ordering, claiming and status transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new queued job and returns its 1-based queue rank.
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<u64, DatabaseError>;

    /// Claims the next eligible job, if any. Never hands the same job to two callers.
    async fn claim_next(&self) -> Result<Option<Job>, DatabaseError>;

    /// Resolves a job. Returns `false` if the reference is unknown.
    async fn record_outcome(
        &self,
        source_file_ref: &str,
        outcome: &JobOutcome,
    ) -> Result<bool, DatabaseError>;

    async fn count_by_status(&self) -> Result<StatusCounts, DatabaseError>;

    async fn position_of(&self, submitter_id: i64) -> Result<Option<u64>, DatabaseError>;

    /// Re-queues processing jobs untouched for longer than `stale_after`.
    async fn reclaim_stale(&self, stale_after: Duration) -> Result<u64, DatabaseError>;

    async fn recent_for_submitter(
        &self,
        submitter_id: i64,
        limit: u32,
    ) -> Result<Vec<Job>, DatabaseError>;

    async fn find_by_ref(&self, source_file_ref: &str) -> Result<Option<Job>, DatabaseError>;

    /// Changes a job's priority. Returns `false` if the reference is unknown.
    async fn set_priority(
        &self,
        source_file_ref: &str,
        priority: i64,
    ) -> Result<bool, DatabaseError>;
}

/// Durable per-submitter counters.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn record_outcome(
        &self,
        submitter_id: i64,
        succeeded: bool,
        bytes: u64,
    ) -> Result<(), DatabaseError>;

    async fn get(&self, submitter_id: i64) -> Result<SubmitterStats, DatabaseError>;
}
