//! Broadcasting of run progress for real-time status streaming.

pub mod run_progress;

pub use run_progress::{RunProgressBroadcaster, RunProgressEvent, RunProgressTracker, RunStatus};
