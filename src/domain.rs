//! Domain module - wire contract, local progress model and collaborator ports
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod errors;
pub mod ports;
pub mod progress;
pub mod render;
pub mod snapshot;

// Re-export commonly used items for convenience
pub use errors::MonitorError;
pub use ports::{AuthProvider, DownloadControl, StaticToken, StatusSource};
pub use progress::{
    CompletedRecord, CompletedRegistry, FileProgressEntry, SessionKind, SessionState, TransferStatus,
};
pub use render::{MonitorNotice, OverallCounter, RenderInstruction, RenderSink};
pub use snapshot::{
    ActionReply, CompletedDownload, ConcurrentDownload, DownloadState, FileId, ProgressSnapshot,
};
