use log::debug;

use crate::frames::FrameRecord;
use crate::paths::RunPaths;
use crate::stage::StageFailure;
use crate::worker::job::Job;

use super::error::PipelineWarning;
use super::state::RunState;

pub struct PipelineContext {
    // Input
    pub job: Job,

    pub state: RunState,

    // Set once paths are resolved; every later step relies on it.
    pub paths: Option<RunPaths>,

    pub original_frames: Vec<FrameRecord>,
    pub pose_frames: Vec<FrameRecord>,

    // Set when pose estimation exits cleanly with its video on disk.
    pub pose_succeeded: bool,

    // Both terminal writes committed.
    pub terminal_written: bool,

    // Set on abort
    pub aborted_in: Option<RunState>,
    pub abort_reason: Option<String>,

    pub failures: Vec<StageFailure>,
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            state: RunState::Uploaded,
            paths: None,
            original_frames: Vec::new(),
            pose_frames: Vec::new(),
            pose_succeeded: false,
            terminal_written: false,
            aborted_in: None,
            abort_reason: None,
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Moves to a later state. Going backwards is a bug in the runner.
    pub fn advance(&mut self, next: RunState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        debug!("{}: {} -> {}", self.job.video_id, self.state, next);
        self.state = next;
    }

    pub fn abort(&mut self, reason: String) {
        self.aborted_in = Some(self.state);
        self.abort_reason = Some(reason);
        self.state = RunState::Aborted;
    }

    pub fn warn(&mut self, warning: PipelineWarning) {
        self.warnings.push(warning);
    }
}
