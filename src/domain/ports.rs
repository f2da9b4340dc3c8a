//! Collaborator traits consumed by the monitor
//!
//! Concrete HTTP implementations live in `infrastructure::api_client`.

use async_trait::async_trait;

use crate::domain::errors::MonitorError;
use crate::domain::snapshot::{ActionReply, DownloadState, ProgressSnapshot};

/// Source of progress snapshots.
///
/// The Poller and the Watchdog may call this concurrently.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_progress(&self) -> Result<ProgressSnapshot, MonitorError>;
}

/// Foreground job-control endpoints
#[async_trait]
pub trait DownloadControl: Send + Sync {
    async fn download_state(&self) -> Result<DownloadState, MonitorError>;

    async fn cancel(&self) -> Result<ActionReply, MonitorError>;

    async fn resume(&self) -> Result<ActionReply, MonitorError>;

    async fn clear_completed(&self) -> Result<ActionReply, MonitorError>;
}

/// Supplies the bearer token for each request
pub trait AuthProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, e.g. from the command line
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl AuthProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
