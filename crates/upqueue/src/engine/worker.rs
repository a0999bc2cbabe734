//! Worker task: runs one claimed job to a recorded outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info, info_span, warn, Instrument};

use super::QueueEngine;
use crate::error::UploadError;
use crate::job::{Job, JobOutcome};
use crate::notifier::{upload_failed_text, upload_started_text, upload_succeeded_text};
use crate::uploader::UploadReceipt;

impl QueueEngine {
    /// Never panics and never returns before the job is resolved, unless the
    /// job store itself refuses the outcome.
    pub(super) async fn process_job(self: Arc<Self>, job: Job) {
        let span = info_span!(
            "upload_job",
            job_id = %job.id,
            source_file_ref = %job.source_file_ref,
            attempt = job.attempts
        );
        let recorded = AtomicBool::new(false);

        let run = AssertUnwindSafe(self.run_job(&job, &recorded))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        if let Err(panic) = run {
            let error = format!("Worker panicked: {}", panic_message(panic.as_ref()));
            error!(parent: &span, "{}", error);
            if !recorded.load(Ordering::Acquire) {
                self.settle(&job, JobOutcome::Failed { error }, None, &recorded)
                    .instrument(span)
                    .await;
            }
        }
    }

    async fn run_job(&self, job: &Job, recorded: &AtomicBool) {
        info!(name = %job.display_name, "Upload started");
        self.notify(job, upload_started_text()).await;

        let result = AssertUnwindSafe(self.uploader.upload(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(UploadError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(receipt) => {
                info!(location = %receipt.location, size = %receipt.size_formatted, "Upload succeeded");
                let outcome = JobOutcome::Uploaded {
                    location: receipt.location.clone(),
                };
                self.settle(job, outcome, Some(&receipt), recorded).await;
            }
            Err(e) => {
                if e.is_terminal() {
                    warn!(error = %e, "Upload rejected");
                } else {
                    warn!(error = %e, "Upload failed");
                }
                let outcome = JobOutcome::Failed {
                    error: e.to_string(),
                };
                self.settle(job, outcome, None, recorded).await;
            }
        }
    }

    /// Records the outcome, then the stats, then tells the submitter.
    ///
    /// If a success cannot be recorded, the job is recorded as failed with
    /// the store error instead. Stats are only touched once the job record
    /// holds the outcome, so each resolved job counts exactly once.
    async fn settle(
        &self,
        job: &Job,
        mut outcome: JobOutcome,
        receipt: Option<&UploadReceipt>,
        recorded: &AtomicBool,
    ) {
        loop {
            match self.jobs.record_outcome(&job.source_file_ref, &outcome).await {
                Ok(found) => {
                    if !found {
                        warn!("Job record disappeared before its outcome was stored");
                    }
                    recorded.store(true, Ordering::Release);
                    break;
                }
                Err(e) if outcome.is_success() => {
                    error!(error = %e, "Failed to record upload success");
                    outcome = JobOutcome::Failed {
                        error: format!("Failed to record upload result: {}", e),
                    };
                }
                Err(e) => {
                    error!(
                        error = %e,
                        "Failed to record upload failure, job stays in processing until reclaimed"
                    );
                    return;
                }
            }
        }

        let succeeded = outcome.is_success();
        let bytes = if succeeded { job.declared_size } else { 0 };
        if let Err(e) = self
            .stats
            .record_outcome(job.submitter_id, succeeded, bytes)
            .await
        {
            error!(error = %e, submitter_id = job.submitter_id, "Failed to update submitter stats");
        }

        let text = match (&outcome, receipt) {
            (JobOutcome::Uploaded { location }, Some(receipt)) => {
                upload_succeeded_text(&job.display_name, location, &receipt.size_formatted)
            }
            (JobOutcome::Uploaded { location }, None) => {
                upload_succeeded_text(&job.display_name, location, "unknown")
            }
            (JobOutcome::Failed { error }, _) => upload_failed_text(error),
        };
        self.notify(job, text).await;
    }

    /// Best-effort: failures and panics are logged and dropped.
    async fn notify(&self, job: &Job, text: String) {
        let sent = AssertUnwindSafe(self.notifier.notify(job.submitter_id, job.message_ref, &text))
            .catch_unwind()
            .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Notification failed"),
            Err(panic) => warn!("Notifier panicked: {}", panic_message(panic.as_ref())),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
