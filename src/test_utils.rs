//! Test utilities for transfer-monitor
//!
//! Scripted collaborators so monitoring tests run without a server and
//! under paused tokio time.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::domain::errors::MonitorError;
use crate::domain::ports::{DownloadControl, StatusSource};
use crate::domain::render::{MonitorNotice, RenderInstruction, RenderSink};
use crate::domain::snapshot::{ActionReply, DownloadState, ProgressSnapshot};

/// Replays queued responses in order; the last one repeats forever.
/// An empty script answers with an idle snapshot.
#[derive(Default)]
pub struct ScriptedStatusSource {
    script: Mutex<VecDeque<Result<ProgressSnapshot, MonitorError>>>,
    calls: AtomicUsize,
}

impl ScriptedStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<ProgressSnapshot, MonitorError>) {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedStatusSource {
    async fn fetch_progress(&self) -> Result<ProgressSnapshot, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match script.len() {
            0 => Ok(ProgressSnapshot::idle()),
            1 => script[0].clone(),
            _ => script.pop_front().unwrap_or_else(|| Ok(ProgressSnapshot::idle())),
        }
    }
}

/// Job-control fake answering every call with a fixed result
pub struct ScriptedControl {
    pub state: Result<DownloadState, MonitorError>,
    pub reply: Result<ActionReply, MonitorError>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedControl {
    pub fn new(
        state: Result<DownloadState, MonitorError>,
        reply: Result<ActionReply, MonitorError>,
    ) -> Self {
        Self {
            state,
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

#[async_trait]
impl DownloadControl for ScriptedControl {
    async fn download_state(&self) -> Result<DownloadState, MonitorError> {
        self.record("state");
        self.state.clone()
    }

    async fn cancel(&self) -> Result<ActionReply, MonitorError> {
        self.record("cancel");
        self.reply.clone()
    }

    async fn resume(&self) -> Result<ActionReply, MonitorError> {
        self.record("resume");
        self.reply.clone()
    }

    async fn clear_completed(&self) -> Result<ActionReply, MonitorError> {
        self.record("clear");
        self.reply.clone()
    }
}

/// Captures everything the engine emits
#[derive(Default)]
pub struct RecordingSink {
    instructions: Mutex<Vec<RenderInstruction>>,
    notices: Mutex<Vec<MonitorNotice>>,
    panic_on_next_render: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `render` call panics once, simulating a crash inside a tick
    pub fn panic_on_next_render(&self) {
        self.panic_on_next_render.store(true, Ordering::SeqCst);
    }

    pub fn instructions(&self) -> Vec<RenderInstruction> {
        self.instructions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn notices(&self) -> Vec<MonitorNotice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.instructions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, instruction: &RenderInstruction) {
        if self.panic_on_next_render.swap(false, Ordering::SeqCst) {
            panic!("render sink failure injected by test");
        }
        self.instructions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(instruction.clone());
    }

    fn notify(&self, notice: &MonitorNotice) {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice.clone());
    }
}

/// Active job with no per-file entries yet
pub fn active_snapshot(progress: u64, total: u64) -> ProgressSnapshot {
    ProgressSnapshot {
        active: true,
        progress,
        total,
        ..ProgressSnapshot::idle()
    }
}

pub fn idle_snapshot() -> ProgressSnapshot {
    ProgressSnapshot::idle()
}

/// Build a snapshot from a JSON literal, panicking on malformed input
pub fn snapshot_from(value: serde_json::Value) -> ProgressSnapshot {
    match serde_json::from_value(value) {
        Ok(snapshot) => snapshot,
        Err(e) => panic!("invalid snapshot fixture: {e}"),
    }
}

#[doc(hidden)]
pub use serde_json::json as __json;

/// `snapshot!({ "active": true, ... })`
#[macro_export]
macro_rules! snapshot {
    ($($json:tt)+) => {{
        $crate::test_utils::snapshot_from($crate::test_utils::__json!($($json)+))
    }};
}
