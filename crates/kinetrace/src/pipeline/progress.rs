use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::run_progress::{RunProgressEvent, RunProgressTracker};

use super::state::RunState;

/// Events emitted by the pipeline while a run progresses.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase {
        state: RunState,
        message: String,
    },
    Completed {
        original_frames: usize,
        pose_frames: usize,
        warnings: Vec<String>,
    },
    Aborted {
        state: RunState,
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events onto the run progress broadcast channel.
pub struct BroadcastProgress {
    tracker: RunProgressTracker,
}

impl BroadcastProgress {
    pub fn new(
        job_id: &str,
        video_id: &str,
        user_id: i64,
        filename: &str,
        sender: Arc<broadcast::Sender<RunProgressEvent>>,
    ) -> Self {
        Self {
            tracker: RunProgressTracker::new(job_id, video_id, user_id, filename, sender),
        }
    }

    pub fn queued(&self) {
        self.tracker.queued();
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { state, message } => {
                self.tracker.update_state(state, &message);
            }
            ProgressEvent::Completed {
                original_frames,
                pose_frames,
                warnings,
            } => {
                self.tracker.completed(original_frames, pose_frames, warnings);
            }
            ProgressEvent::Aborted { state, error } => {
                self.tracker.aborted(state, &error);
            }
        }
    }
}
