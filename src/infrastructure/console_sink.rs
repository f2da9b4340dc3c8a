//! Terminal render sink used by the CLI
//!
//! One line per instruction on stdout. Active entries whose last server
//! update is older than the stall threshold get a `[stalled Ns]` badge.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::progress::{FileProgressEntry, TransferStatus};
use crate::domain::render::{MonitorNotice, RenderInstruction, RenderSink};

pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    stall_threshold: Duration,
    /// Re-assertions are noisy on a terminal; only show them when asked
    show_ensures: bool,
}

impl ConsoleSink {
    pub fn stdout(stall_threshold: Duration) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), stall_threshold)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, stall_threshold: Duration) -> Self {
        Self {
            out: Mutex::new(out),
            stall_threshold,
            show_ensures: false,
        }
    }

    #[must_use]
    pub fn show_ensures(mut self, show: bool) -> Self {
        self.show_ensures = show;
        self
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!("console sink write failed: {}", e);
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_entry(entry: &FileProgressEntry, now: DateTime<Utc>, stall_threshold: Duration) -> String {
    match entry.status {
        TransferStatus::Completed => {
            let mut line = format!("✅ {} ({:.0}%)", entry.display_name, entry.percentage);
            if let Some(path) = &entry.storage_path {
                line.push_str(&format!(" -> {path}"));
            }
            line
        }
        TransferStatus::Active => {
            let mut line = format!("⬇️ {} {:>5.1}%", entry.display_name, entry.percentage);
            if entry.bytes_total > 0 {
                line.push_str(&format!(
                    " ({} / {})",
                    human_bytes(entry.bytes_transferred),
                    human_bytes(entry.bytes_total)
                ));
            }
            if let Some(attempt) = entry.retry_attempt {
                line.push_str(&format!(" [retry {attempt}]"));
            }
            if entry.is_stalled(now, stall_threshold) {
                if let Some(age) = entry.stall_age(now) {
                    line.push_str(&format!(" [stalled {}s]", age.as_secs()));
                }
            }
            line
        }
    }
}

/// `None` for instructions this sink skips
pub fn format_instruction(
    instruction: &RenderInstruction,
    now: DateTime<Utc>,
    stall_threshold: Duration,
    show_ensures: bool,
) -> Option<String> {
    match instruction {
        RenderInstruction::RenderCompleted { entry } | RenderInstruction::UpsertActive { entry } => {
            Some(format_entry(entry, now, stall_threshold))
        }
        RenderInstruction::EnsureCompleted { entry } => {
            show_ensures.then(|| format_entry(entry, now, stall_threshold))
        }
        RenderInstruction::OverallCounter(counter) => Some(format!("📊 {counter}")),
        RenderInstruction::ClearCompleted { removed } => {
            Some(format!("🧹 cleared {} completed transfer(s)", removed.len()))
        }
    }
}

impl RenderSink for ConsoleSink {
    fn render(&self, instruction: &RenderInstruction) {
        if let Some(line) = format_instruction(instruction, Utc::now(), self.stall_threshold, self.show_ensures) {
            self.write_line(&line);
        }
    }

    fn notify(&self, notice: &MonitorNotice) {
        let icon = match notice {
            MonitorNotice::SessionComplete { .. } | MonitorNotice::ActionSucceeded { .. } => "🎉",
            MonitorNotice::ServerBusy { .. } => "⏳",
            MonitorNotice::AuthRequired { .. } => "🔒",
            MonitorNotice::ConnectionLost { .. } | MonitorNotice::ActionFailed { .. } => "❌",
        };
        self.write_line(&format!("{icon} {notice}"));
    }
}
