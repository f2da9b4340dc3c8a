//! Snapshot reconciliation
//!
//! `reconcile` is a pure transform from (local state, snapshot) to
//! (new local state, render instructions). Every snapshot is treated as the
//! full authoritative picture, never as a delta, so the Poller and the
//! Watchdog can interleave their requests without corrupting anything.

use crate::domain::progress::{CompletedRecord, CompletedRegistry, FileProgressEntry, SessionState};
use crate::domain::render::{MonitorNotice, OverallCounter, RenderInstruction};
use crate::domain::snapshot::{FileId, ProgressSnapshot};

/// Everything the reconciler reads and writes
#[derive(Debug, Clone)]
pub struct LocalState {
    pub session: SessionState,
    pub registry: CompletedRegistry,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub state: LocalState,
    pub instructions: Vec<RenderInstruction>,
    /// Ids inserted into the registry by this pass
    pub newly_completed: Vec<FileId>,
    /// The job reported inactive after having been active in this session
    pub finished: bool,
    /// Present only the first time `finished` is observed in a session
    pub announcement: Option<MonitorNotice>,
}

pub fn reconcile(state: LocalState, snapshot: &ProgressSnapshot) -> Reconciliation {
    let LocalState {
        mut session,
        mut registry,
    } = state;

    // Ids known before this pass only get the idempotent re-assertion
    let ensures: Vec<RenderInstruction> = registry
        .iter()
        .map(|(id, record)| RenderInstruction::EnsureCompleted {
            entry: record.to_entry(id.clone()),
        })
        .collect();

    let mut instructions = Vec::with_capacity(
        snapshot.completed_downloads.len() + ensures.len() + snapshot.concurrent_downloads.len() + 1,
    );
    let mut newly_completed = Vec::new();

    for (id, download) in &snapshot.completed_downloads {
        if registry.insert(id.clone(), CompletedRecord::from_download(download)) {
            newly_completed.push(id.clone());
            instructions.push(RenderInstruction::RenderCompleted {
                entry: FileProgressEntry::completed(id.clone(), download),
            });
        }
    }

    instructions.extend(ensures);

    if snapshot.active {
        for (id, download) in &snapshot.concurrent_downloads {
            // stale-data guard
            if registry.contains(id) {
                continue;
            }
            instructions.push(RenderInstruction::UpsertActive {
                entry: FileProgressEntry::active(id.clone(), download),
            });
        }
    }

    let finished = !snapshot.active && session.has_observed_active;
    let mut announcement = None;
    if finished && !session.has_announced_completion {
        session.has_announced_completion = true;
        announcement = Some(MonitorNotice::SessionComplete {
            completed_count: snapshot.completed_downloads.len(),
        });
    }

    if snapshot.total > 0 {
        instructions.push(RenderInstruction::OverallCounter(OverallCounter {
            progress: snapshot.progress,
            total: snapshot.total,
        }));
    }

    session.is_active = snapshot.active;
    session.total_files = snapshot.total;
    session.completed_files = snapshot.progress;
    if snapshot.active {
        session.has_observed_active = true;
        session.idle_polls = 0;
    } else if !session.has_observed_active {
        session.idle_polls = session.idle_polls.saturating_add(1);
    }

    Reconciliation {
        state: LocalState { session, registry },
        instructions,
        newly_completed,
        finished,
        announcement,
    }
}
