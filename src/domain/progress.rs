//! Local progress model: per-file entries, session state, completed registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::snapshot::{CompletedDownload, ConcurrentDownload, FileId};

/// Render state of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Active,
    Completed,
}

/// Structured record handed to the render sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProgressEntry {
    pub file_id: FileId,
    pub display_name: String,
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    /// 0-100
    pub percentage: f64,
    pub status: TransferStatus,
    pub retry_attempt: Option<u32>,
    pub last_server_update: Option<DateTime<Utc>>,
    pub storage_path: Option<String>,
}

impl FileProgressEntry {
    pub fn active(file_id: FileId, download: &ConcurrentDownload) -> Self {
        Self {
            file_id,
            display_name: download.name.clone(),
            bytes_transferred: download.progress,
            bytes_total: download.total,
            percentage: download.effective_percentage(),
            status: TransferStatus::Active,
            retry_attempt: download.retry_attempt,
            last_server_update: download.last_update,
            storage_path: None,
        }
    }

    pub fn completed(file_id: FileId, download: &CompletedDownload) -> Self {
        let size = download.size.unwrap_or(0);
        Self {
            file_id,
            display_name: download.name.clone(),
            bytes_transferred: size,
            bytes_total: size,
            percentage: download.effective_percentage(),
            status: TransferStatus::Completed,
            retry_attempt: None,
            last_server_update: download.completed_at,
            storage_path: download.path.clone(),
        }
    }

    /// Zero-progress placeholder shown before the server reports the file
    pub fn placeholder(file_id: FileId, display_name: impl Into<String>) -> Self {
        Self {
            file_id,
            display_name: display_name.into(),
            bytes_transferred: 0,
            bytes_total: 0,
            percentage: 0.0,
            status: TransferStatus::Active,
            retry_attempt: None,
            last_server_update: None,
            storage_path: None,
        }
    }

    /// Age of the last server update, only meaningful while active
    #[must_use]
    pub fn stall_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.status != TransferStatus::Active {
            return None;
        }
        let last = self.last_server_update?;
        (now - last).to_std().ok()
    }

    #[must_use]
    pub fn is_stalled(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.stall_age(now).is_some_and(|age| age > threshold)
    }
}

/// How the current session was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    Single,
    Batch,
    Resumed,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Single => write!(f, "single-file"),
            SessionKind::Batch => write!(f, "batch"),
            SessionKind::Resumed => write!(f, "resumed"),
        }
    }
}

/// Per-session monitoring state; discarded when monitoring stops
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: Uuid,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub is_active: bool,
    pub total_files: u64,
    pub completed_files: u64,
    pub error_count: u32,
    pub has_observed_active: bool,
    pub has_announced_completion: bool,
    pub last_successful_poll_at: Instant,
    /// Consecutive successful inactive polls before any active one
    pub idle_polls: u32,
}

impl SessionState {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            is_active: false,
            total_files: 0,
            completed_files: 0,
            error_count: 0,
            has_observed_active: false,
            has_announced_completion: false,
            last_successful_poll_at: Instant::now(),
            idle_polls: 0,
        }
    }
}

/// What the registry remembers about a finished transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub storage_path: Option<String>,
    pub display_name: String,
    pub size: Option<u64>,
    pub percentage: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompletedRecord {
    pub fn from_download(download: &CompletedDownload) -> Self {
        Self {
            storage_path: download.path.clone(),
            display_name: download.name.clone(),
            size: download.size,
            percentage: download.effective_percentage(),
            completed_at: download.completed_at,
        }
    }

    pub fn to_entry(&self, file_id: FileId) -> FileProgressEntry {
        let size = self.size.unwrap_or(0);
        FileProgressEntry {
            file_id,
            display_name: self.display_name.clone(),
            bytes_transferred: size,
            bytes_total: size,
            percentage: self.percentage,
            status: TransferStatus::Completed,
            retry_attempt: None,
            last_server_update: self.completed_at,
            storage_path: self.storage_path.clone(),
        }
    }
}

/// Ids that finished in this or an earlier session.
///
/// Grows monotonically; only [`CompletedRegistry::clear`] removes entries.
/// An id in here is never rendered as active again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletedRegistry {
    records: BTreeMap<FileId, CompletedRecord>,
}

impl CompletedRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, file_id: &FileId) -> bool {
        self.records.contains_key(file_id)
    }

    /// Returns `false` if the id was already registered (record untouched)
    pub fn insert(&mut self, file_id: FileId, record: CompletedRecord) -> bool {
        if self.records.contains_key(&file_id) {
            return false;
        }
        self.records.insert(file_id, record);
        true
    }

    #[must_use]
    pub fn get(&self, file_id: &FileId) -> Option<&CompletedRecord> {
        self.records.get(file_id)
    }

    pub fn storage_path(&self, file_id: &FileId) -> Option<&str> {
        self.records.get(file_id)?.storage_path.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FileId, &CompletedRecord)> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every record, returning the ids that were dropped
    pub fn clear(&mut self) -> Vec<FileId> {
        std::mem::take(&mut self.records).into_keys().collect()
    }
}
