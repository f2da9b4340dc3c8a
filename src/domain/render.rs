//! Render instructions and user-facing notices
//!
//! The engine never produces markup. It emits structured instructions and a
//! [`RenderSink`] decides what they look like.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::progress::FileProgressEntry;
use crate::domain::snapshot::FileId;

/// One thing the view layer should do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderInstruction {
    /// Newly finished transfer: replace an existing element or append one
    RenderCompleted { entry: FileProgressEntry },
    /// Idempotent re-assertion for an id already known to be finished
    EnsureCompleted { entry: FileProgressEntry },
    /// Update an in-flight element, creating it if missing
    UpsertActive { entry: FileProgressEntry },
    /// Overall `n/m files` counter
    OverallCounter(OverallCounter),
    /// Drop every element rendered in the completed state
    ClearCompleted { removed: Vec<FileId> },
}

impl RenderInstruction {
    #[must_use]
    pub fn file_id(&self) -> Option<&FileId> {
        match self {
            RenderInstruction::RenderCompleted { entry }
            | RenderInstruction::EnsureCompleted { entry }
            | RenderInstruction::UpsertActive { entry } => Some(&entry.file_id),
            RenderInstruction::OverallCounter(_) | RenderInstruction::ClearCompleted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallCounter {
    pub progress: u64,
    pub total: u64,
}

impl fmt::Display for OverallCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} files", self.progress, self.total)
    }
}

/// User-visible messages (toasts, alerts)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorNotice {
    /// Announced at most once per session
    SessionComplete { completed_count: usize },
    /// Poller gave up after too many consecutive failures
    ConnectionLost { consecutive_errors: u32 },
    /// Foreground action rejected with 401
    AuthRequired { action: String },
    /// 503/504/408 seen; monitoring keeps going
    ServerBusy { status: u16 },
    /// Foreground action failed for another reason
    ActionFailed { action: String, detail: String },
    /// Foreground action succeeded
    ActionSucceeded { action: String, message: String },
}

impl fmt::Display for MonitorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorNotice::SessionComplete { completed_count } => {
                write!(f, "Download complete: {completed_count} file(s) finished")
            }
            MonitorNotice::ConnectionLost { consecutive_errors } => write!(
                f,
                "Lost connection to the server after {consecutive_errors} failed attempts"
            ),
            MonitorNotice::AuthRequired { action } => {
                write!(f, "Session expired, please log in again ({action})")
            }
            MonitorNotice::ServerBusy { status } => {
                write!(f, "Server is busy ({status}), retrying")
            }
            MonitorNotice::ActionFailed { action, detail } => write!(f, "{action} failed: {detail}"),
            MonitorNotice::ActionSucceeded { action, message } => write!(f, "{action}: {message}"),
        }
    }
}

/// View-side collaborator.
///
/// Calls happen while the monitor's state lock is held, so implementations
/// must not call back into the controller.
pub trait RenderSink: Send + Sync {
    fn render(&self, instruction: &RenderInstruction);

    fn notify(&self, notice: &MonitorNotice);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_text() {
        let counter = OverallCounter { progress: 1, total: 3 };
        assert_eq!(counter.to_string(), "1/3 files");
    }

    #[test]
    fn test_instruction_serializes_with_kind_tag() {
        let instruction = RenderInstruction::OverallCounter(OverallCounter { progress: 2, total: 4 });
        let value = serde_json::to_value(&instruction).unwrap();
        assert_eq!(value["kind"], "overall_counter");
        assert_eq!(value["total"], 4);
    }
}
