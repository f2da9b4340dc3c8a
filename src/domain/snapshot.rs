//! Wire-level progress snapshot returned by `GET /download-progress`
//!
//! The payload is treated as untrusted: only `active` is required, every
//! other field falls back to a neutral default, and loosely typed values
//! (timestamps, retry counters) degrade to "absent" instead of failing the
//! whole poll.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one transfer, either server-issued or synthesized locally
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id the server assigns to a single-file transfer of `message_id`
    #[must_use]
    pub fn single(message_id: i64) -> Self {
        Self(format!("single_{message_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One poll result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub active: bool,
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed_downloads: BTreeMap<FileId, CompletedDownload>,
    #[serde(default)]
    pub concurrent_downloads: BTreeMap<FileId, ConcurrentDownload>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl ProgressSnapshot {
    /// An inactive snapshot with nothing in it
    #[must_use]
    pub fn idle() -> Self {
        Self {
            active: false,
            progress: 0,
            total: 0,
            completed_downloads: BTreeMap::new(),
            concurrent_downloads: BTreeMap::new(),
            session_id: None,
            channel: None,
            cancelled: false,
        }
    }

    /// Parse a raw response body
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Entry of `completed_downloads`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletedDownload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompletedDownload {
    /// Completed entries render full unless the server says otherwise
    #[must_use]
    pub fn effective_percentage(&self) -> f64 {
        self.percentage.unwrap_or(100.0)
    }
}

/// Entry of `concurrent_downloads`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConcurrentDownload {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_bytes")]
    pub progress: u64,
    #[serde(default, deserialize_with = "lenient_bytes")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_retry")]
    pub retry_attempt: Option<u32>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
}

impl ConcurrentDownload {
    /// Server percentage, else derived from bytes, else 0
    #[must_use]
    pub fn effective_percentage(&self) -> f64 {
        if let Some(pct) = self.percentage {
            return pct;
        }
        if self.total > 0 {
            ((self.progress as f64 / self.total as f64) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Response of `GET /download/state`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DownloadState {
    #[serde(default)]
    pub has_saved_state: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub completed_count: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl DownloadState {
    /// A saved, inactive session with work left is worth offering to resume
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.has_saved_state && !self.active && self.channel.is_some() && self.completed_count < self.total
    }
}

/// Body of `POST /download/{cancel,resume,clear-completed}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ActionReply {
    #[must_use]
    pub fn text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .unwrap_or("")
    }
}

fn lenient_bytes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u64(deserializer)?.unwrap_or(0))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    })
}

fn lenient_percentage<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.clamp(0.0, 100.0)))
}

fn lenient_retry<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .filter(|n| *n >= 1)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX)))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value))
}

/// Epoch seconds (int or float) or an RFC 3339 / naive ISO string
pub(crate) fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() || secs < 0.0 {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                // ISO 8601 without an offset
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        _ => None,
    }
}
