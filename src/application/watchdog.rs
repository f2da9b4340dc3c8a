//! Stall watchdog
//!
//! Runs on a slower period next to the Poller. When no poll has succeeded for
//! longer than the stall threshold it makes one diagnostic request of its
//! own; the only remediation it ever performs is restarting the Poller.

use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::application::monitor::{MonitorContext, WatchdogVerdict};
use crate::application::poller::TaskSlot;

pub(crate) fn spawn_watchdog(ctx: Arc<MonitorContext>, generation: u64) -> TaskSlot {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let period = ctx.config.watchdog_interval();

    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let verdict = tokio::select! {
                biased;
                () = token.cancelled() => break,
                verdict = ctx.watchdog_check(generation, &token) => verdict,
            };

            if verdict == WatchdogVerdict::Stale {
                break;
            }
        }

        debug!("🐕 Watchdog loop exited (generation {})", generation);
    });

    TaskSlot { handle, cancel }
}
