//! Shared monitoring context
//!
//! Owns the state that the Poller and the Watchdog share: the current
//! [`SessionState`], the [`CompletedRegistry`] and the timer handles. All of it
//! sits behind one async mutex and every callback re-checks the session
//! generation after acquiring it, so a callback that outlives its session
//! becomes a no-op.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::poller::{spawn_poller, PollerState, StopReason, TaskSlot};
use crate::application::reconciler::{reconcile, LocalState};
use crate::application::watchdog::spawn_watchdog;
use crate::domain::errors::MonitorError;
use crate::domain::ports::StatusSource;
use crate::domain::progress::{CompletedRegistry, SessionKind, SessionState};
use crate::domain::render::{MonitorNotice, RenderSink};
use crate::domain::snapshot::ProgressSnapshot;
use crate::infrastructure::config::MonitorConfig;

/// What the Poller should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickVerdict {
    Continue,
    Stop,
    /// The tick belongs to a session that no longer exists
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchdogVerdict {
    Healthy,
    Restarted,
    PollerAlive,
    JobInactive,
    DiagnosticFailed,
    Stale,
}

pub(crate) struct MonitorCore {
    pub(crate) session: Option<SessionState>,
    pub(crate) registry: CompletedRegistry,
    pub(crate) generation: u64,
    pub(crate) poller: Option<TaskSlot>,
    pub(crate) watchdog: Option<TaskSlot>,
    pub(crate) poller_state: PollerState,
    pub(crate) busy_notified: bool,
    pub(crate) watchdog_restarts: u32,
}

impl MonitorCore {
    fn new() -> Self {
        Self {
            session: None,
            registry: CompletedRegistry::new(),
            generation: 0,
            poller: None,
            watchdog: None,
            poller_state: PollerState::Idle,
            busy_notified: false,
            watchdog_restarts: 0,
        }
    }

    pub(crate) fn poller_is_live(&self) -> bool {
        self.poller.as_ref().is_some_and(TaskSlot::is_live)
    }

    pub(crate) fn watchdog_is_live(&self) -> bool {
        self.watchdog.as_ref().is_some_and(TaskSlot::is_live)
    }

    fn teardown_timers(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown();
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.shutdown();
        }
    }
}

pub(crate) struct MonitorContext {
    pub(crate) source: Arc<dyn StatusSource>,
    pub(crate) sink: Arc<dyn RenderSink>,
    pub(crate) config: MonitorConfig,
    pub(crate) core: Mutex<MonitorCore>,
    state_tx: watch::Sender<PollerState>,
}

impl MonitorContext {
    pub(crate) fn new(
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn RenderSink>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(PollerState::Idle);
        Arc::new(Self {
            source,
            sink,
            config,
            core: Mutex::new(MonitorCore::new()),
            state_tx,
        })
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, core: &mut MonitorCore, state: PollerState) {
        core.poller_state = state.clone();
        self.state_tx.send_replace(state);
    }

    /// Tear down any previous timers and start a fresh session
    pub(crate) fn start_locked(self: &Arc<Self>, core: &mut MonitorCore, kind: SessionKind) -> u64 {
        core.teardown_timers();
        core.generation = core.generation.wrapping_add(1);
        let generation = core.generation;

        let session = SessionState::new(kind);
        info!(
            "🚀 Monitoring started: {} session {} (generation {})",
            kind, session.session_id, generation
        );
        core.session = Some(session);
        core.busy_notified = false;
        core.poller = Some(spawn_poller(Arc::clone(self), generation));
        core.watchdog = Some(spawn_watchdog(Arc::clone(self), generation));
        self.set_state(core, PollerState::Running);
        generation
    }

    /// Cancel both timers and drop the session; the registry survives
    pub(crate) fn finish_locked(&self, core: &mut MonitorCore, terminal: PollerState) {
        core.teardown_timers();
        if let Some(session) = core.session.take() {
            info!(
                "🏁 Monitoring ended for session {}: {:?} ({} completed file(s) on record)",
                session.session_id,
                terminal,
                core.registry.len()
            );
        }
        self.set_state(core, terminal);
    }

    pub(crate) async fn apply_poll(
        self: &Arc<Self>,
        generation: u64,
        token: &CancellationToken,
        result: Result<ProgressSnapshot, MonitorError>,
    ) -> TickVerdict {
        let mut core = self.core.lock().await;
        if token.is_cancelled() || core.generation != generation || core.session.is_none() {
            debug!("Discarding poll result from stale generation {}", generation);
            return TickVerdict::Stale;
        }

        match result {
            Ok(snapshot) => self.apply_snapshot_locked(&mut core, &snapshot),
            Err(error) => self.apply_error_locked(&mut core, &error),
        }
    }

    pub(crate) fn apply_snapshot_locked(
        &self,
        core: &mut MonitorCore,
        snapshot: &ProgressSnapshot,
    ) -> TickVerdict {
        let Some(mut session) = core.session.take() else {
            return TickVerdict::Stale;
        };
        session.error_count = 0;
        session.last_successful_poll_at = tokio::time::Instant::now();
        core.busy_notified = false;

        let result = reconcile(
            LocalState {
                session,
                registry: std::mem::take(&mut core.registry),
            },
            snapshot,
        );
        let idle_polls = result.state.session.idle_polls;
        core.session = Some(result.state.session);
        core.registry = result.state.registry;

        debug!(
            "📥 Snapshot applied: active={} {}/{} ({} instruction(s), {} newly completed)",
            snapshot.active,
            snapshot.progress,
            snapshot.total,
            result.instructions.len(),
            result.newly_completed.len()
        );

        // lifecycle settles before any sink call
        let limit = self.config.idle_poll_limit;
        let verdict = if result.finished {
            self.finish_locked(
                core,
                PollerState::Stopped {
                    reason: StopReason::Completed,
                },
            );
            TickVerdict::Stop
        } else if limit > 0 && idle_polls >= limit {
            warn!("⏹️ Job never reported active after {} polls, stopping", idle_polls);
            self.finish_locked(
                core,
                PollerState::Stopped {
                    reason: StopReason::NeverStarted,
                },
            );
            TickVerdict::Stop
        } else {
            TickVerdict::Continue
        };

        for instruction in &result.instructions {
            self.sink.render(instruction);
        }
        if let Some(notice) = &result.announcement {
            info!("🎉 {}", notice);
            self.sink.notify(notice);
        }

        verdict
    }

    fn apply_error_locked(&self, core: &mut MonitorCore, error: &MonitorError) -> TickVerdict {
        if !error.counts_toward_threshold() {
            // background chrome: the auth collaborator owns the redirect
            warn!("🔒 Background poll rejected ({}), stopping silently", error);
            self.finish_locked(
                core,
                PollerState::Stopped {
                    reason: StopReason::AuthRejected,
                },
            );
            return TickVerdict::Stop;
        }

        let Some(session) = core.session.as_mut() else {
            return TickVerdict::Stale;
        };
        session.error_count = session.error_count.saturating_add(1);
        let error_count = session.error_count;
        debug!(
            "Poll failed [{}] ({}/{}): {}",
            error.reason(),
            error_count,
            self.config.max_consecutive_errors,
            error
        );

        if error_count >= self.config.max_consecutive_errors {
            error!("❌ {} consecutive poll failures, giving up: {}", error_count, error);
            self.sink.notify(&MonitorNotice::ConnectionLost {
                consecutive_errors: error_count,
            });
            self.finish_locked(
                core,
                PollerState::FatalError {
                    consecutive_errors: error_count,
                },
            );
            return TickVerdict::Stop;
        }

        if let MonitorError::ServerBusy { status, .. } = error {
            if !core.busy_notified {
                core.busy_notified = true;
                self.sink.notify(&MonitorNotice::ServerBusy { status: *status });
            }
        }

        TickVerdict::Continue
    }

    pub(crate) async fn watchdog_check(
        self: &Arc<Self>,
        generation: u64,
        token: &CancellationToken,
    ) -> WatchdogVerdict {
        let threshold = self.config.watchdog_stall_threshold();
        let elapsed = {
            let core = self.core.lock().await;
            if token.is_cancelled() || core.generation != generation {
                return WatchdogVerdict::Stale;
            }
            let Some(session) = core.session.as_ref() else {
                return WatchdogVerdict::Stale;
            };
            session.last_successful_poll_at.elapsed()
        };

        if elapsed <= threshold {
            debug!("🐕 Watchdog: last successful poll {:?} ago", elapsed);
            return WatchdogVerdict::Healthy;
        }

        warn!("⚠️ No successful poll for {:?}, running diagnostic poll", elapsed);
        let diagnostic = self.source.fetch_progress().await;

        let mut core = self.core.lock().await;
        if token.is_cancelled() || core.generation != generation || core.session.is_none() {
            return WatchdogVerdict::Stale;
        }

        match diagnostic {
            Ok(snapshot) if snapshot.active => {
                if core.poller_is_live() {
                    warn!("🐕 Job still active and poller alive; waiting for it to recover");
                    return WatchdogVerdict::PollerAlive;
                }

                if let Some(dead) = core.poller.take() {
                    dead.shutdown();
                }
                if let Some(session) = core.session.as_mut() {
                    session.error_count = 0;
                }
                core.poller = Some(spawn_poller(Arc::clone(self), generation));
                core.watchdog_restarts = core.watchdog_restarts.saturating_add(1);
                self.set_state(&mut core, PollerState::Running);
                warn!(
                    "🔄 Poller was not running while the job is active, restarted (restart #{})",
                    core.watchdog_restarts
                );
                WatchdogVerdict::Restarted
            }
            Ok(_) => {
                info!("🐕 Diagnostic poll reports the job inactive");
                WatchdogVerdict::JobInactive
            }
            Err(error) => {
                warn!("🐕 Diagnostic poll failed [{}]: {}", error.reason(), error);
                WatchdogVerdict::DiagnosticFailed
            }
        }
    }
}
