//! Application layer module
//!
//! The reconciler plus the timer-driven machinery around it: Poller,
//! Watchdog and the Session Controller that owns them.

mod monitor;
pub mod poller;
pub mod reconciler;
pub mod session_controller;
pub mod watchdog;

pub use poller::{PollerState, StopReason};
pub use reconciler::{reconcile, LocalState, Reconciliation};
pub use session_controller::{MonitorStatus, SessionController};
