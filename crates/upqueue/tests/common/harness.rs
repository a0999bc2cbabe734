//! Test harness for isolated engine runs.
//!
//! Each harness owns its own in-memory database. Store writes read time
//! from a clock the test can move forward with [`TestHarness::advance`].

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use upqueue::store::Clock;
use upqueue::{
    Database, EngineConfig, EngineState, JobStore, QueueEngine, SqliteJobStore, SqliteStatsStore,
};

use super::fakes::{RecordingNotifier, ScriptedUploader};

pub struct TestHarness {
    pub engine: Arc<QueueEngine>,
    pub jobs: Arc<SqliteJobStore>,
    pub uploader: Arc<ScriptedUploader>,
    pub notifier: Arc<RecordingNotifier>,
    offset_secs: Arc<AtomicI64>,
}

/// Short sleeps so the loop reacts within a few milliseconds.
pub fn fast_config(max_concurrent_uploads: usize) -> EngineConfig {
    EngineConfig {
        max_concurrent_uploads,
        idle_poll: Duration::from_millis(10),
        backpressure_poll: Duration::from_millis(10),
        dispatch_pacing: Duration::ZERO,
        store_error_backoff: Duration::from_millis(10),
        stale_after: Duration::from_secs(3600),
        ..EngineConfig::default()
    }
}

impl TestHarness {
    pub fn new(uploader: ScriptedUploader) -> Self {
        Self::with_settings(uploader, fast_config(3), 3)
    }

    pub fn with_settings(uploader: ScriptedUploader, config: EngineConfig, max_attempts: u32) -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");

        let base: DateTime<Utc> = Utc::now();
        let offset_secs = Arc::new(AtomicI64::new(0));
        let clock: Clock = {
            let offset = Arc::clone(&offset_secs);
            Arc::new(move || base + ChronoDuration::seconds(offset.load(Ordering::SeqCst)))
        };

        let jobs = Arc::new(SqliteJobStore::new(db.clone(), max_attempts).with_clock(clock.clone()));
        let stats = Arc::new(SqliteStatsStore::new(db).with_clock(clock));
        let uploader = Arc::new(uploader);
        let notifier = Arc::new(RecordingNotifier::default());

        let engine = Arc::new(QueueEngine::new(
            jobs.clone() as Arc<dyn JobStore>,
            stats,
            uploader.clone(),
            notifier.clone(),
            config,
        ));

        Self {
            engine,
            jobs,
            uploader,
            notifier,
            offset_secs,
        }
    }

    /// Moves the store clock forward.
    pub fn advance(&self, by: Duration) {
        self.offset_secs
            .fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }

    /// Stops the engine and waits until it is idle again.
    pub async fn shutdown(&self) {
        self.engine.stop();
        let mut state = self.engine.watch_state();
        tokio::time::timeout(
            Duration::from_secs(10),
            state.wait_for(|s| *s == EngineState::Idle),
        )
        .await
        .expect("engine did not go idle")
        .expect("state channel closed");
    }
}

/// Polls `check` until it returns true or ten seconds pass.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
