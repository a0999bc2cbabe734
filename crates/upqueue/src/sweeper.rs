//! Periodic recovery of jobs abandoned in `processing`.
//!
//! Runs independently of the queue engine. The first sweep happens one
//! interval after start; a manual trigger forces an immediate sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::JobStore;

pub struct RecoverySweeper {
    jobs: Arc<dyn JobStore>,
    interval: Duration,
    stale_after: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl RecoverySweeper {
    pub fn new(jobs: Arc<dyn JobStore>, interval: Duration, stale_after: Duration) -> Self {
        Self {
            jobs,
            interval,
            stale_after,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Starts the sweep loop on the current runtime.
    /// Accepts a trigger receiver for manual sweep requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;
        let stale_after = self.stale_after;

        tokio::spawn(async move {
            info!(?interval, ?stale_after, "Recovery sweeper started");

            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await; // skip immediate first tick

            let mut triggers_open = true;

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = timer.tick() => {}
                    trigger = trigger_rx.recv(), if triggers_open => match trigger {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            info!("Manual stale-job sweep triggered");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Sweep trigger channel closed, interval sweeps only");
                            triggers_open = false;
                            continue;
                        }
                    },
                    _ = wake.notified() => {}
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                match jobs.reclaim_stale(stale_after).await {
                    Ok(0) => debug!("Stale-job sweep found nothing"),
                    Ok(n) => info!(reclaimed = n, "Re-queued stale jobs"),
                    Err(e) => error!("Stale-job sweep failed: {}", e),
                }
            }

            info!("Recovery sweeper stopped");
        })
    }

    /// Signals the sweeper to stop and wakes it up.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
