use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::pipeline::{PipelineContext, PipelineWarning, RunState};
use crate::stage::StageFailure;

/// One uploaded video waiting to go through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    /// Absolute path of the uploaded file.
    pub input_path: PathBuf,
    /// Uploaded filename; reused for every derived video.
    pub filename: String,
    pub video_id: String,
    pub user_id: i64,
}

impl Job {
    pub fn new(input_path: PathBuf, filename: &str, video_id: &str, user_id: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input_path,
            filename: filename.to_string(),
            video_id: video_id.to_string(),
            user_id,
        }
    }

    /// Creates a job whose filename is taken from the input path.
    pub fn from_upload(input_path: PathBuf, video_id: &str, user_id: i64) -> Option<Self> {
        let filename = input_path.file_name()?.to_str()?.to_string();
        Some(Self::new(input_path, &filename, video_id, user_id))
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub job_id: String,
    pub video_id: String,
    pub user_id: i64,
    pub filename: String,
    pub final_state: RunState,
    /// State the run was in when it aborted.
    pub aborted_in: Option<RunState>,
    pub abort_reason: Option<String>,
    pub original_frames: usize,
    pub pose_frames: usize,
    pub failures: Vec<StageFailure>,
    pub warnings: Vec<PipelineWarning>,
    /// Both terminal writes (status and history) committed.
    pub terminal_written: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn from_context(ctx: &PipelineContext, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: ctx.job.id.clone(),
            video_id: ctx.job.video_id.clone(),
            user_id: ctx.job.user_id,
            filename: ctx.job.filename.clone(),
            final_state: ctx.state,
            aborted_in: ctx.aborted_in,
            abort_reason: ctx.abort_reason.clone(),
            original_frames: ctx.original_frames.len(),
            pose_frames: ctx.pose_frames.len(),
            failures: ctx.failures.clone(),
            warnings: ctx.warnings.clone(),
            terminal_written: ctx.terminal_written,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn completed(&self) -> bool {
        self.final_state == RunState::Completed
    }
}
