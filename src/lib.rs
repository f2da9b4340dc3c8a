//! transfer-monitor - download-progress monitoring and reconciliation
//!
//! Polls a remote job-status endpoint, reconciles each snapshot into
//! render instructions, watches for a dead poller and stops cleanly when
//! the job finishes or the server stays unreachable.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod test_utils;

pub use application::{MonitorStatus, PollerState, SessionController, StopReason};
pub use domain::{
    FileId, MonitorError, MonitorNotice, ProgressSnapshot, RenderInstruction, RenderSink, SessionKind,
};
pub use infrastructure::{ApiClient, AppConfig, ConfigManager, ConsoleSink};
