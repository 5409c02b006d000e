//! Run progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::RunState;

/// Overall status of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Aborted,
}

/// Progress event for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgressEvent {
    pub job_id: String,
    pub video_id: String,
    pub user_id: i64,
    pub filename: String,
    /// State the run has reached (for aborts: the state it failed in).
    pub state: RunState,
    pub status: RunStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_frames: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_frames: Option<usize>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Broadcasts run progress events to any number of subscribers.
#[derive(Clone)]
pub struct RunProgressBroadcaster {
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: RunProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunProgressEvent> {
        self.sender.subscribe()
    }

    pub fn sender(&self) -> Arc<broadcast::Sender<RunProgressEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for RunProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Emits the events of a single run.
pub struct RunProgressTracker {
    job_id: String,
    video_id: String,
    user_id: i64,
    filename: String,
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressTracker {
    pub fn new(
        job_id: &str,
        video_id: &str,
        user_id: i64,
        filename: &str,
        sender: Arc<broadcast::Sender<RunProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            video_id: video_id.to_string(),
            user_id,
            filename: filename.to_string(),
            sender,
        }
    }

    fn event(&self, state: RunState, status: RunStatus, message: &str) -> RunProgressEvent {
        RunProgressEvent {
            job_id: self.job_id.clone(),
            video_id: self.video_id.clone(),
            user_id: self.user_id,
            filename: self.filename.clone(),
            state,
            status,
            message: message.to_string(),
            timestamp: Utc::now(),
            original_frames: None,
            pose_frames: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn queued(&self) {
        let event = self.event(RunState::Uploaded, RunStatus::Queued, "Run queued");
        let _ = self.sender.send(event);
    }

    pub fn update_state(&self, state: RunState, message: &str) {
        let event = self.event(state, RunStatus::Running, message);
        let _ = self.sender.send(event);
    }

    pub fn completed(&self, original_frames: usize, pose_frames: usize, warnings: Vec<String>) {
        let mut event = self.event(
            RunState::Completed,
            RunStatus::Completed,
            "Processing completed",
        );
        event.original_frames = Some(original_frames);
        event.pose_frames = Some(pose_frames);
        event.warnings = warnings;
        let _ = self.sender.send(event);
    }

    pub fn aborted(&self, state: RunState, error: &str) {
        let mut event = self.event(state, RunStatus::Aborted, "Processing aborted");
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
