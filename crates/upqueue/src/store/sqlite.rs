//! SQLite-backed stores. Each call runs its repository function on the
//! blocking pool via [`Database::call`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{system_clock, Clock, JobStore, StatsStore};
use crate::db::{job_repo, stats_repo, Database, DatabaseError};
use crate::job::{Job, JobDescriptor, JobOutcome, StatusCounts, SubmitterStats};

/// Job store over the `upload_jobs` table.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
    max_attempts: u32,
    clock: Clock,
}

impl SqliteJobStore {
    /// New jobs get `max_attempts` as their attempt ceiling.
    pub fn new(db: Database, max_attempts: u32) -> Self {
        Self {
            db,
            max_attempts,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// `now - stale_after`, saturating at the earliest representable instant.
fn stale_cutoff(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<u64, DatabaseError> {
        let descriptor = descriptor.clone();
        let max_attempts = self.max_attempts;
        let now = self.now();
        self.db
            .call(move |db| job_repo::insert_queued(db, &descriptor, max_attempts, now))
            .await
    }

    async fn claim_next(&self) -> Result<Option<Job>, DatabaseError> {
        let now = self.now();
        self.db.call(move |db| job_repo::claim_next(db, now)).await
    }

    async fn record_outcome(
        &self,
        source_file_ref: &str,
        outcome: &JobOutcome,
    ) -> Result<bool, DatabaseError> {
        let source_file_ref = source_file_ref.to_string();
        let outcome = outcome.clone();
        let now = self.now();
        self.db
            .call(move |db| job_repo::record_outcome(db, &source_file_ref, &outcome, now))
            .await
    }

    async fn count_by_status(&self) -> Result<StatusCounts, DatabaseError> {
        self.db.call(job_repo::count_by_status).await
    }

    async fn position_of(&self, submitter_id: i64) -> Result<Option<u64>, DatabaseError> {
        self.db
            .call(move |db| job_repo::position_of(db, submitter_id))
            .await
    }

    async fn reclaim_stale(&self, stale_after: Duration) -> Result<u64, DatabaseError> {
        let now = self.now();
        let cutoff = stale_cutoff(now, stale_after);
        self.db
            .call(move |db| job_repo::reclaim_stale(db, cutoff, now))
            .await
    }

    async fn recent_for_submitter(
        &self,
        submitter_id: i64,
        limit: u32,
    ) -> Result<Vec<Job>, DatabaseError> {
        self.db
            .call(move |db| job_repo::recent_for_submitter(db, submitter_id, limit))
            .await
    }

    async fn find_by_ref(&self, source_file_ref: &str) -> Result<Option<Job>, DatabaseError> {
        let source_file_ref = source_file_ref.to_string();
        self.db
            .call(move |db| job_repo::find_by_ref(db, &source_file_ref))
            .await
    }

    async fn set_priority(
        &self,
        source_file_ref: &str,
        priority: i64,
    ) -> Result<bool, DatabaseError> {
        let source_file_ref = source_file_ref.to_string();
        let now = self.now();
        self.db
            .call(move |db| job_repo::set_priority(db, &source_file_ref, priority, now))
            .await
    }
}

/// Stats store over the `submitter_stats` table.
#[derive(Clone)]
pub struct SqliteStatsStore {
    db: Database,
    clock: Clock,
}

impl SqliteStatsStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl StatsStore for SqliteStatsStore {
    async fn record_outcome(
        &self,
        submitter_id: i64,
        succeeded: bool,
        bytes: u64,
    ) -> Result<(), DatabaseError> {
        let now = (self.clock)();
        self.db
            .call(move |db| stats_repo::record_outcome(db, submitter_id, succeeded, bytes, now))
            .await
    }

    async fn get(&self, submitter_id: i64) -> Result<SubmitterStats, DatabaseError> {
        self.db
            .call(move |db| stats_repo::get(db, submitter_id))
            .await
    }
}
