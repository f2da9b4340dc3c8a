//! Session controller
//!
//! Public entry point of the engine. Starts and stops monitoring sessions,
//! owns the completed registry across sessions and runs the foreground
//! actions (cancel, resume, clear) that are allowed to surface errors.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::monitor::MonitorContext;
use crate::application::poller::{PollerState, StopReason};
use crate::domain::errors::MonitorError;
use crate::domain::ports::{DownloadControl, StatusSource};
use crate::domain::progress::{FileProgressEntry, SessionKind};
use crate::domain::render::{MonitorNotice, RenderInstruction, RenderSink};
use crate::domain::snapshot::{ActionReply, DownloadState, FileId, ProgressSnapshot};
use crate::infrastructure::config::MonitorConfig;

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub poller: PollerState,
    pub session_id: Option<Uuid>,
    pub session_kind: Option<SessionKind>,
    pub error_count: u32,
    pub completed_files: usize,
    pub poller_running: bool,
    pub watchdog_running: bool,
    pub watchdog_restarts: u32,
}

pub struct SessionController {
    ctx: Arc<MonitorContext>,
    control: Option<Arc<dyn DownloadControl>>,
}

impl SessionController {
    pub fn new(
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn RenderSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            ctx: MonitorContext::new(source, sink, config),
            control: None,
        }
    }

    /// Enable the foreground actions
    #[must_use]
    pub fn with_control(mut self, control: Arc<dyn DownloadControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Start a fresh session, replacing any running one.
    ///
    /// At most one Poller and one Watchdog exist afterwards. Ids finished in
    /// earlier sessions stay in the registry.
    pub async fn start_monitoring(&self, kind: SessionKind) -> Uuid {
        let mut core = self.ctx.core.lock().await;
        self.ctx.start_locked(&mut core, kind);
        core.session
            .as_ref()
            .map(|session| session.session_id)
            .unwrap_or_else(Uuid::nil)
    }

    /// Returns false when nothing was running
    pub async fn stop_monitoring(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut core = self.ctx.core.lock().await;
        if core.session.is_none() && core.poller.is_none() && core.watchdog.is_none() {
            debug!("stop_monitoring({}) with no active session", reason);
            return false;
        }
        info!("⏹️ Stopping monitoring: {}", reason);
        self.ctx.finish_locked(
            &mut core,
            PollerState::Stopped {
                reason: StopReason::Requested(reason),
            },
        );
        true
    }

    /// Resume after a page load when the server reports a job in flight.
    ///
    /// The snapshot is reconciled immediately under the same lock that starts
    /// the session, so the first view is populated before the first tick.
    /// With a Poller already running the snapshot is folded into the live
    /// session instead and `false` is returned.
    pub async fn resume_if_active(&self, snapshot: &ProgressSnapshot) -> bool {
        if !snapshot.active {
            debug!("No active job to resume");
            return false;
        }

        let mut core = self.ctx.core.lock().await;
        if core.poller_is_live() {
            debug!("Poller already running, reconciling into the current session");
            self.ctx.apply_snapshot_locked(&mut core, snapshot);
            return false;
        }
        self.ctx.start_locked(&mut core, SessionKind::Resumed);
        self.ctx.apply_snapshot_locked(&mut core, snapshot);
        info!(
            "🔁 Resumed monitoring of an active job ({}/{} files)",
            snapshot.progress, snapshot.total
        );
        true
    }

    /// Forget every completed transfer and tell the view to drop them
    pub async fn clear_completed(&self) -> usize {
        let mut core = self.ctx.core.lock().await;
        if core.poller_is_live() {
            warn!("Clearing completed transfers while monitoring is running");
        }
        let removed = core.registry.clear();
        let count = removed.len();
        self.ctx
            .sink
            .render(&RenderInstruction::ClearCompleted { removed });
        info!("🧹 Cleared {} completed transfer(s)", count);
        count
    }

    /// Start a single-file session with a zero-progress placeholder.
    ///
    /// A file already in the completed registry keeps its completed element;
    /// it is re-asserted instead of being reset to a placeholder.
    pub async fn begin_single_file(&self, message_id: i64, display_name: &str) -> FileId {
        let file_id = FileId::single(message_id);
        let mut core = self.ctx.core.lock().await;
        let instruction = match core.registry.get(&file_id) {
            Some(record) => {
                debug!("{} already completed, keeping its completed element", file_id);
                RenderInstruction::EnsureCompleted {
                    entry: record.to_entry(file_id.clone()),
                }
            }
            None => RenderInstruction::UpsertActive {
                entry: FileProgressEntry::placeholder(file_id.clone(), display_name),
            },
        };
        self.ctx.sink.render(&instruction);
        self.ctx.start_locked(&mut core, SessionKind::Single);
        file_id
    }

    /// Check for a saved session on load and resume monitoring if the job
    /// is still running. Failures are logged and swallowed.
    pub async fn resume_on_load(&self) -> Option<DownloadState> {
        let state = match self.control.as_ref()?.download_state().await {
            Ok(state) => state,
            Err(error) => {
                debug!("download state unavailable on load: {}", error);
                return None;
            }
        };

        if state.active {
            match self.ctx.source.fetch_progress().await {
                Ok(snapshot) => {
                    self.resume_if_active(&snapshot).await;
                }
                Err(error) => debug!("progress unavailable on load: {}", error),
            }
        }
        Some(state)
    }

    pub async fn download_state(&self) -> Result<DownloadState, MonitorError> {
        let control = self.control()?;
        let result = control.download_state().await;
        self.report("download state", result, |_| None)
    }

    /// Cancel the server job and stop monitoring
    pub async fn cancel_download(&self) -> Result<ActionReply, MonitorError> {
        let control = self.control()?;
        let result = control.cancel().await;
        if result.is_ok() {
            self.stop_monitoring("download cancelled").await;
        }
        self.report("cancel", result, |reply| Some(reply.text().to_string()))
    }

    /// Resume the saved job on the server and start a `Resumed` session
    pub async fn resume_download(&self) -> Result<ActionReply, MonitorError> {
        let control = self.control()?;
        let result = control.resume().await;
        if result.is_ok() {
            self.start_monitoring(SessionKind::Resumed).await;
        }
        self.report("resume", result, |reply| Some(reply.text().to_string()))
    }

    /// Clear completed entries on the server, then locally
    pub async fn clear_completed_remote(&self) -> Result<ActionReply, MonitorError> {
        let control = self.control()?;
        let result = control.clear_completed().await;
        if result.is_ok() {
            self.clear_completed().await;
        }
        self.report("clear completed", result, |reply| Some(reply.text().to_string()))
    }

    pub async fn status(&self) -> MonitorStatus {
        let core = self.ctx.core.lock().await;
        MonitorStatus {
            poller: core.poller_state.clone(),
            session_id: core.session.as_ref().map(|s| s.session_id),
            session_kind: core.session.as_ref().map(|s| s.kind),
            error_count: core.session.as_ref().map_or(0, |s| s.error_count),
            completed_files: core.registry.len(),
            poller_running: core.poller_is_live(),
            watchdog_running: core.watchdog_is_live(),
            watchdog_restarts: core.watchdog_restarts,
        }
    }

    /// Storage path recorded for a finished transfer
    pub async fn completed_path(&self, file_id: &FileId) -> Option<String> {
        let core = self.ctx.core.lock().await;
        core.registry.storage_path(file_id).map(str::to_string)
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.ctx.subscribe()
    }

    /// Resolves once the Poller leaves `Running`
    pub async fn wait_until_stopped(&self) -> PollerState {
        let mut rx = self.subscribe();
        let stopped = rx
            .wait_for(|state| !state.is_running())
            .await
            .map(|state| state.clone());
        match stopped {
            Ok(state) => state,
            Err(_) => self.status().await.poller,
        }
    }

    fn control(&self) -> Result<&Arc<dyn DownloadControl>, MonitorError> {
        self.control
            .as_ref()
            .ok_or_else(|| MonitorError::Config("download control is not configured".to_string()))
    }

    /// Foreground actions surface their outcome to the sink
    fn report<T>(
        &self,
        action: &str,
        result: Result<T, MonitorError>,
        success: impl FnOnce(&T) -> Option<String>,
    ) -> Result<T, MonitorError> {
        let notice = match &result {
            Ok(value) => success(value)
                .filter(|message| !message.is_empty())
                .map(|message| MonitorNotice::ActionSucceeded {
                    action: action.to_string(),
                    message,
                }),
            Err(error) if error.is_auth() => Some(MonitorNotice::AuthRequired {
                action: action.to_string(),
            }),
            Err(MonitorError::ServerBusy { status, .. }) => {
                Some(MonitorNotice::ServerBusy { status: *status })
            }
            Err(error) => Some(MonitorNotice::ActionFailed {
                action: action.to_string(),
                detail: error.to_string(),
            }),
        };

        if let Err(error) = &result {
            warn!("{} failed [{}]: {}", action, error.reason(), error);
        }
        if let Some(notice) = notice {
            self.ctx.sink.notify(&notice);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingSink, ScriptedStatusSource, active_snapshot, idle_snapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 100,
            watchdog_interval_ms: 1_000,
            watchdog_stall_threshold_ms: 2_000,
            ..MonitorConfig::default()
        }
    }

    fn transport_error() -> MonitorError {
        MonitorError::transport("/download-progress", "connection refused")
    }

    fn controller(source: &Arc<ScriptedStatusSource>, sink: &Arc<RecordingSink>) -> SessionController {
        SessionController::new(source.clone(), sink.clone(), config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_do_not_stop_but_five_do() {
        let source = Arc::new(ScriptedStatusSource::new());
        for _ in 0..4 {
            source.push(Err(transport_error()));
        }
        source.push(Ok(active_snapshot(0, 2)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(450)).await;
        let status = ctl.status().await;
        assert!(status.poller.is_running());
        assert!(sink.notices().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ctl.status().await.error_count, 0);

        for _ in 0..5 {
            source.push(Err(transport_error()));
        }
        let state = ctl.wait_until_stopped().await;
        assert_eq!(state, PollerState::FatalError { consecutive_errors: 5 });
        assert_eq!(
            sink.notices(),
            vec![MonitorNotice::ConnectionLost { consecutive_errors: 5 }]
        );
        assert!(!ctl.status().await.watchdog_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_auth_failure_stops_silently() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Err(MonitorError::Auth {
            endpoint: "/download-progress".into(),
        }));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        let state = ctl.wait_until_stopped().await;
        assert_eq!(
            state,
            PollerState::Stopped {
                reason: StopReason::AuthRejected
            }
        );
        assert!(sink.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_finishing_stops_both_timers_and_announces_once() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 1)));
        source.push(Ok(serde_json::from_value(serde_json::json!({
            "active": false, "progress": 1, "total": 1,
            "completed_downloads": {"f1": {"name": "a.mp4", "path": "/d/a.mp4"}}
        }))
        .unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        let state = ctl.wait_until_stopped().await;
        assert_eq!(
            state,
            PollerState::Stopped {
                reason: StopReason::Completed
            }
        );
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            sink.notices(),
            vec![MonitorNotice::SessionComplete { completed_count: 1 }]
        );
        let status = ctl.status().await;
        assert!(!status.poller_running);
        assert!(!status.watchdog_running);
        assert_eq!(status.completed_files, 1);
        assert_eq!(ctl.completed_path(&"f1".into()).await.as_deref(), Some("/d/a.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_job_never_completes_a_fresh_session() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(idle_snapshot()));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(ctl.status().await.poller.is_running());
        assert!(sink.notices().is_empty());
        ctl.stop_monitoring("test over").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_guard_stops_sessions_that_never_start() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(idle_snapshot()));
        let sink = Arc::new(RecordingSink::new());
        let ctl = SessionController::new(
            source.clone(),
            sink.clone(),
            MonitorConfig {
                idle_poll_limit: 3,
                ..config()
            },
        );

        ctl.start_monitoring(SessionKind::Batch).await;
        assert_eq!(
            ctl.wait_until_stopped().await,
            PollerState::Stopped {
                reason: StopReason::NeverStarted
            }
        );
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarting_keeps_a_single_poller() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 3)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        let first = ctl.start_monitoring(SessionKind::Batch).await;
        let second = ctl.start_monitoring(SessionKind::Batch).await;
        assert_ne!(first, second);

        tokio::time::sleep(Duration::from_millis(950)).await;
        // one tick at start plus one per 100ms period
        let calls = source.calls();
        assert!((10..=11).contains(&calls), "unexpected poll count {calls}");
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_registry_and_is_idempotent() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(serde_json::from_value(serde_json::json!({
            "active": true, "total": 2,
            "completed_downloads": {"f1": {"name": "a.mp4"}}
        }))
        .unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ctl.stop_monitoring("navigated away").await);
        assert!(!ctl.stop_monitoring("again").await);

        let status = ctl.status().await;
        assert_eq!(status.completed_files, 1);
        assert_eq!(status.session_id, None);

        assert_eq!(ctl.clear_completed().await, 1);
        assert_eq!(ctl.status().await.completed_files, 0);
        assert!(matches!(
            sink.instructions().last(),
            Some(RenderInstruction::ClearCompleted { removed }) if removed == &vec![FileId::from("f1")]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_restarts_a_dead_poller() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 3)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let core = ctl.ctx.core.lock().await;
            core.poller.as_ref().unwrap().handle.abort();
        }

        // stall threshold 2s, watchdog period 1s
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let status = ctl.status().await;
        assert_eq!(status.watchdog_restarts, 1);
        assert!(status.poller_running);
        assert!(status.poller.is_running());
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_if_active_renders_before_first_tick() {
        let source = Arc::new(ScriptedStatusSource::new());
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        assert!(!ctl.resume_if_active(&idle_snapshot()).await);
        assert!(ctl.resume_if_active(&active_snapshot(1, 4)).await);

        assert!(matches!(
            sink.instructions().first(),
            Some(RenderInstruction::OverallCounter(counter)) if counter.progress == 1 && counter.total == 4
        ));
        assert_eq!(ctl.status().await.session_kind, Some(SessionKind::Resumed));
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_single_file_renders_placeholder() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 1)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        let id = ctl.begin_single_file(42, "clip.mp4").await;
        assert_eq!(id.as_str(), "single_42");
        match sink.instructions().first() {
            Some(RenderInstruction::UpsertActive { entry }) => {
                assert_eq!(entry.file_id, id);
                assert_eq!(entry.percentage, 0.0);
            }
            other => panic!("unexpected first instruction {other:?}"),
        }
        assert_eq!(ctl.status().await.session_kind, Some(SessionKind::Single));
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_if_active_keeps_a_running_session() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 2)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        let first = ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(!ctl.resume_if_active(&active_snapshot(1, 2)).await);
        let status = ctl.status().await;
        assert_eq!(status.session_id, Some(first));
        assert_eq!(status.session_kind, Some(SessionKind::Batch));
        assert!(status.poller_running);
        assert!(matches!(
            sink.instructions().last(),
            Some(RenderInstruction::OverallCounter(counter)) if counter.progress == 1
        ));
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_single_file_keeps_a_completed_file_completed() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(serde_json::from_value(serde_json::json!({
            "active": true, "total": 1,
            "completed_downloads": {"single_42": {"name": "clip.mp4", "path": "/d/clip.mp4"}}
        }))
        .unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Single).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctl.stop_monitoring("done").await;
        sink.clear();

        let id = ctl.begin_single_file(42, "clip.mp4").await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        let instructions = sink.instructions();
        assert!(!instructions.iter().any(
            |i| matches!(i, RenderInstruction::UpsertActive { entry } if entry.file_id == id)
        ));
        match instructions.first() {
            Some(RenderInstruction::EnsureCompleted { entry }) => {
                assert_eq!(entry.file_id, id);
                assert_eq!(entry.storage_path.as_deref(), Some("/d/clip.mp4"));
            }
            other => panic!("unexpected first instruction {other:?}"),
        }
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payloads_share_the_error_threshold() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Err(MonitorError::protocol("/download-progress", "missing field `active`")));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(ctl.status().await.poller.is_running());
        assert_eq!(ctl.status().await.error_count, 4);

        assert_eq!(
            ctl.wait_until_stopped().await,
            PollerState::FatalError { consecutive_errors: 5 }
        );
        assert_eq!(
            sink.notices(),
            vec![MonitorNotice::ConnectionLost { consecutive_errors: 5 }]
        );
    }

    /// Kill the poller once its first tick has landed, then script what the
    /// watchdog's diagnostic poll will see
    async fn kill_poller_then_script(
        ctl: &SessionController,
        source: &ScriptedStatusSource,
        diagnostic: Result<ProgressSnapshot, MonitorError>,
    ) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let core = ctl.ctx.core.lock().await;
            core.poller.as_ref().unwrap().handle.abort();
        }
        source.push(diagnostic);
        // drop the first tick's response so the diagnostic is next
        let _ = source.fetch_progress().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_leaves_an_inactive_job_alone() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 3)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        kill_poller_then_script(&ctl, &source, Ok(idle_snapshot())).await;
        sink.clear();

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let status = ctl.status().await;
        assert_eq!(status.watchdog_restarts, 0);
        assert!(!status.poller_running);
        assert!(status.watchdog_running);
        assert!(sink.instructions().is_empty());
        assert!(sink.notices().is_empty());
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_does_not_restart_on_failed_diagnostic() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 3)));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        kill_poller_then_script(&ctl, &source, Err(transport_error())).await;
        let calls = source.calls();

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let status = ctl.status().await;
        assert_eq!(status.watchdog_restarts, 0);
        assert!(!status.poller_running);
        // only the watchdog's diagnostic at the 3s tick
        assert_eq!(source.calls(), calls + 1);
        ctl.stop_monitoring("done").await;
    }

    /// Answers active, except for one call that never returns
    struct HangingSource {
        calls: AtomicUsize,
        hang_on: usize,
    }

    #[async_trait::async_trait]
    impl StatusSource for HangingSource {
        async fn fetch_progress(&self) -> Result<ProgressSnapshot, MonitorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.hang_on {
                std::future::pending::<()>().await;
            }
            Ok(active_snapshot(0, 3))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_never_doubles_a_stuck_poller() {
        let source = Arc::new(HangingSource {
            calls: AtomicUsize::new(0),
            hang_on: 2,
        });
        let sink = Arc::new(RecordingSink::new());
        let ctl = SessionController::new(source.clone(), sink.clone(), config());

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let status = ctl.status().await;
        assert_eq!(status.watchdog_restarts, 0);
        assert!(status.poller_running);
        // two poller calls, then one diagnostic per watchdog tick past the threshold
        let calls = source.calls.load(Ordering::SeqCst);
        assert!((3..=5).contains(&calls), "unexpected call count {calls}");
        ctl.stop_monitoring("done").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_panic_on_final_tick_still_completes() {
        let source = Arc::new(ScriptedStatusSource::new());
        source.push(Ok(active_snapshot(0, 1)));
        source.push(Ok(serde_json::from_value(serde_json::json!({
            "active": false, "progress": 1, "total": 1,
            "completed_downloads": {"f1": {"name": "a.mp4"}}
        }))
        .unwrap()));
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        ctl.start_monitoring(SessionKind::Batch).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        sink.panic_on_next_render();

        assert_eq!(
            ctl.wait_until_stopped().await,
            PollerState::Stopped {
                reason: StopReason::Completed
            }
        );
        tokio::time::sleep(Duration::from_secs(3)).await;
        let status = ctl.status().await;
        assert_eq!(status.session_id, None);
        assert!(!status.watchdog_running);
        assert_eq!(status.completed_files, 1);
    }

    #[tokio::test]
    async fn test_actions_without_control_are_config_errors() {
        let source = Arc::new(ScriptedStatusSource::new());
        let sink = Arc::new(RecordingSink::new());
        let ctl = controller(&source, &sink);

        assert!(matches!(ctl.cancel_download().await, Err(MonitorError::Config(_))));
        assert!(ctl.resume_on_load().await.is_none());
    }
}
