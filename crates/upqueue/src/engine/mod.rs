//! Queue engine: claims jobs under a concurrency ceiling and runs them.
//!
//! One coordinating task owns the claim loop and a `JoinSet` of worker
//! tasks. Engine state lives in a `watch` channel: `start` and `stop` are
//! compare-and-set transitions on it, and the loop wakes up from its sleeps
//! whenever it changes.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time;
use tracing::{debug, error, info, trace, warn};

use crate::db::DatabaseError;
use crate::error::Result;
use crate::job::{Job, JobDescriptor, StatusCounts, SubmitterStats};
use crate::notifier::Notifier;
use crate::store::{JobStore, StatsStore};
use crate::uploader::Uploader;

mod worker;

use worker::panic_message;

/// Number of resolved jobs returned by [`QueueEngine::recent_uploads`].
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Tuning knobs for the claim loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on jobs uploading at the same time.
    pub max_concurrent_uploads: usize,
    /// Sleep when nothing is claimable.
    pub idle_poll: Duration,
    /// Sleep when every worker slot is taken (cut short when a worker finishes).
    pub backpressure_poll: Duration,
    /// Delay after each dispatch.
    pub dispatch_pacing: Duration,
    /// Sleep after the job store fails a claim.
    pub store_error_backoff: Duration,
    /// Threshold used by [`QueueEngine::cleanup_stale`].
    pub stale_after: Duration,
    pub recent_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 3,
            idle_poll: Duration::from_secs(5),
            backpressure_poll: Duration::from_secs(1),
            dispatch_pacing: Duration::from_millis(500),
            store_error_backoff: Duration::from_secs(5),
            stale_after: Duration::from_secs(3600),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
}

pub struct QueueEngine {
    jobs: Arc<dyn JobStore>,
    stats: Arc<dyn StatsStore>,
    uploader: Arc<dyn Uploader>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    state: watch::Sender<EngineState>,
    in_flight: Arc<AtomicUsize>,
}

impl QueueEngine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        stats: Arc<dyn StatsStore>,
        uploader: Arc<dyn Uploader>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        Self {
            jobs,
            stats,
            uploader,
            notifier,
            config,
            state,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_processing(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Workers currently uploading.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Subscribes to state changes, e.g. to wait for the engine to go idle.
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Starts the claim loop. Returns `None` if the engine is not idle.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let started = self.state.send_if_modified(|state| {
            if *state == EngineState::Idle {
                *state = EngineState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            debug!("Queue engine already {:?}, start ignored", self.state());
            return None;
        }

        let engine = Arc::clone(self);
        Some(tokio::spawn(async move { engine.supervise().await }))
    }

    /// Stops claiming new jobs. In-flight uploads finish before the loop
    /// task completes. Returns `false` if the engine was not running.
    pub fn stop(&self) -> bool {
        let stopped = self.state.send_if_modified(|state| {
            if *state == EngineState::Running {
                *state = EngineState::Stopping;
                true
            } else {
                false
            }
        });
        if stopped {
            info!("Queue engine stopping");
        }
        stopped
    }

    /// Validates and stores a submission, returning its queue position.
    pub async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<u64> {
        descriptor.validate()?;
        let position = self.jobs.enqueue(descriptor).await?;
        info!(
            source_file_ref = %descriptor.source_file_ref,
            submitter_id = descriptor.submitter_id,
            position,
            "Job enqueued"
        );
        Ok(position)
    }

    pub async fn queue_stats(&self) -> std::result::Result<StatusCounts, DatabaseError> {
        self.jobs.count_by_status().await
    }

    pub async fn user_position(
        &self,
        submitter_id: i64,
    ) -> std::result::Result<Option<u64>, DatabaseError> {
        self.jobs.position_of(submitter_id).await
    }

    pub async fn user_stats(
        &self,
        submitter_id: i64,
    ) -> std::result::Result<SubmitterStats, DatabaseError> {
        self.stats.get(submitter_id).await
    }

    /// The submitter's latest resolved jobs, newest first.
    pub async fn recent_uploads(
        &self,
        submitter_id: i64,
    ) -> std::result::Result<Vec<Job>, DatabaseError> {
        self.jobs
            .recent_for_submitter(submitter_id, self.config.recent_limit)
            .await
    }

    /// Changes a job's priority. Higher priorities are claimed first.
    pub async fn set_priority(
        &self,
        source_file_ref: &str,
        priority: i64,
    ) -> std::result::Result<bool, DatabaseError> {
        let found = self.jobs.set_priority(source_file_ref, priority).await?;
        if found {
            info!(source_file_ref, priority, "Job priority changed");
        }
        Ok(found)
    }

    /// Runs one stale-job reclaim pass with the configured threshold.
    pub async fn cleanup_stale(&self) -> std::result::Result<u64, DatabaseError> {
        let reclaimed = self.jobs.reclaim_stale(self.config.stale_after).await?;
        if reclaimed > 0 {
            info!(reclaimed, "Re-queued stale jobs");
        }
        Ok(reclaimed)
    }

    /// Owns the loop task: survives a loop panic, drains workers, releases
    /// the uploader and returns the engine to idle.
    async fn supervise(self: Arc<Self>) {
        info!(
            max_concurrent_uploads = self.config.max_concurrent_uploads,
            "Queue processing started"
        );

        let mut workers = JoinSet::new();
        let outcome = AssertUnwindSafe(self.run_loop(&mut workers))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            error!("Queue loop crashed: {}", panic_message(panic.as_ref()));
            self.state.send_replace(EngineState::Stopping);
        }

        if !workers.is_empty() {
            info!(count = workers.len(), "Waiting for in-flight uploads");
        }
        while let Some(res) = workers.join_next().await {
            reap(res);
        }

        self.uploader.close().await;
        self.state.send_replace(EngineState::Idle);
        info!("Queue processing stopped");
    }

    async fn run_loop(self: &Arc<Self>, workers: &mut JoinSet<()>) {
        let mut state_rx = self.state.subscribe();

        loop {
            let state = *state_rx.borrow_and_update();
            if state != EngineState::Running {
                break;
            }

            while let Some(res) = workers.try_join_next() {
                reap(res);
            }

            if workers.len() >= self.config.max_concurrent_uploads {
                trace!("All upload slots occupied");
                tokio::select! {
                    Some(res) = workers.join_next() => reap(res),
                    _ = time::sleep(self.config.backpressure_poll) => {}
                    _ = state_rx.changed() => {}
                }
                continue;
            }

            match self.jobs.claim_next().await {
                Ok(Some(job)) => {
                    debug!(
                        job_id = %job.id,
                        source_file_ref = %job.source_file_ref,
                        attempt = job.attempts,
                        "Claimed job"
                    );
                    let engine = Arc::clone(self);
                    let guard = InFlightGuard::new(Arc::clone(&self.in_flight));
                    workers.spawn(async move {
                        let _guard = guard;
                        engine.process_job(job).await;
                    });
                    pause(&mut state_rx, self.config.dispatch_pacing).await;
                }
                Ok(None) => {
                    trace!("No claimable jobs");
                    pause(&mut state_rx, self.config.idle_poll).await;
                }
                Err(e) => {
                    warn!(
                        "Failed to claim next job, retrying in {:?}: {}",
                        self.config.store_error_backoff, e
                    );
                    pause(&mut state_rx, self.config.store_error_backoff).await;
                }
            }
        }
    }
}

/// Sleeps for `duration`, waking early on any state change.
async fn pause(state_rx: &mut watch::Receiver<EngineState>, duration: Duration) {
    tokio::select! {
        _ = time::sleep(duration) => {}
        _ = state_rx.changed() => {}
    }
}

fn reap(res: std::result::Result<(), JoinError>) {
    if let Err(e) = res {
        error!("Upload worker did not finish: {}", e);
    }
}

/// Counts a worker from spawn until its task is dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
