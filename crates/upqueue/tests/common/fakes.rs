//! Scripted stand-ins for the hosting service and the chat front-end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use upqueue::error::NotifyError;
use upqueue::{format_size, Job, Notifier, UploadError, UploadReceipt, Uploader};

/// What the uploader does for a given source reference.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    Reject { status: u16, body: &'static str },
    Transient(&'static str),
    Panic(&'static str),
}

/// Uploader that follows a per-reference script and records what it saw.
pub struct ScriptedUploader {
    scripts: Mutex<HashMap<String, Script>>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedUploader {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            gate: None,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Every upload blocks until the gate hands out a permit.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn script(self, source_file_ref: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_file_ref.to_string(), script);
        self
    }

    /// Source references in the order uploads began.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of uploads seen running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Decrements the active counter even when the upload panics.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    async fn upload(&self, job: &Job) -> Result<UploadReceipt, UploadError> {
        self.calls.lock().unwrap().push(job.source_file_ref.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&job.source_file_ref)
            .cloned()
            .unwrap_or(Script::Succeed);

        match script {
            Script::Succeed => Ok(UploadReceipt {
                location: format!("https://files.test/{}", job.source_file_ref),
                size_formatted: format_size(job.declared_size),
            }),
            Script::Reject { status, body } => Err(UploadError::Rejected {
                status,
                body: body.to_string(),
            }),
            Script::Transient(reason) => Err(UploadError::Transient(reason.to_string())),
            Script::Panic(message) => panic!("{}", message),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A notification as the submitter would receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub submitter_id: i64,
    pub message_ref: i64,
    pub text: String,
}

/// Records every notification. When failing, it still records the text
/// but reports the chat front-end as unreachable.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent in reply to one submission.
    pub fn texts_for(&self, message_ref: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.message_ref == message_ref)
            .map(|s| s.text)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, submitter_id: i64, message_ref: i64, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Sent {
            submitter_id,
            message_ref,
            text: text.to_string(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError {
                submitter_id,
                reason: "chat unreachable".to_string(),
            });
        }
        Ok(())
    }
}
