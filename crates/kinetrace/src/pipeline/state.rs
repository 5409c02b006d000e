use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a run is in the stage sequence.
///
/// Variants are declared in execution order; a run only ever moves to a
/// later state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Uploaded,
    Detecting,
    Detected,
    ExtractingFrames,
    FramesExtracted,
    EstimatingPose,
    PoseEstimated,
    RecognizingAction,
    ExtractingPoseFrames,
    PoseFramesExtracted,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Uploaded => "Uploaded",
            RunState::Detecting => "Detecting",
            RunState::Detected => "Detected",
            RunState::ExtractingFrames => "Extracting frames",
            RunState::FramesExtracted => "Frames extracted",
            RunState::EstimatingPose => "Estimating pose",
            RunState::PoseEstimated => "Pose estimated",
            RunState::RecognizingAction => "Recognizing action",
            RunState::ExtractingPoseFrames => "Extracting pose frames",
            RunState::PoseFramesExtracted => "Pose frames extracted",
            RunState::Completed => "Completed",
            RunState::Aborted => "Aborted",
        };
        f.write_str(label)
    }
}
