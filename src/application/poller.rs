//! Primary status poller
//!
//! One spawned task per session ticking on a fixed period. Each tick awaits
//! its own request before the next one can fire, so a slow endpoint delays
//! polling instead of piling up concurrent requests.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::application::monitor::{MonitorContext, TickVerdict};

/// Lifecycle of the Poller: `Idle -> Running -> (Stopped | FatalError)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Running,
    Stopped { reason: StopReason },
    FatalError { consecutive_errors: u32 },
}

impl PollerState {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, PollerState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Job went inactive after having been active
    Completed,
    /// Explicit stop from the caller (cancel, navigation...)
    Requested(String),
    /// 401 on a background poll
    AuthRejected,
    /// Idle guard: the job never reported active
    NeverStarted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::Requested(why) => write!(f, "requested ({why})"),
            StopReason::AuthRejected => write!(f, "authentication rejected"),
            StopReason::NeverStarted => write!(f, "job never became active"),
        }
    }
}

/// Handle to a spawned timer task
#[derive(Debug)]
pub(crate) struct TaskSlot {
    pub(crate) handle: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
}

impl TaskSlot {
    /// Neither cancelled nor exited (a panicked task counts as exited)
    pub(crate) fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Cooperative stop; callbacks already in flight see the token and bail
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub(crate) fn spawn_poller(ctx: Arc<MonitorContext>, generation: u64) -> TaskSlot {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let period = ctx.config.poll_interval();

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                () = token.cancelled() => break,
                result = ctx.source.fetch_progress() => result,
            };

            match ctx.apply_poll(generation, &token, result).await {
                TickVerdict::Continue => {}
                TickVerdict::Stop | TickVerdict::Stale => break,
            }
        }

        debug!("🛑 Poller loop exited (generation {})", generation);
    });

    TaskSlot { handle, cancel }
}
