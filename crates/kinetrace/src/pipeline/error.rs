use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::db::frame_repo::FrameKind;
use crate::stage::{StageFailure, StageKind};

/// Failures that end a run early.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Filesystem failure: {0}")]
    Filesystem(#[from] crate::error::FilesystemError),

    #[error("{0}")]
    Stage(#[from] StageFailure),
}

/// Problems a run records and then carries on from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// A write group was rolled back.
    PersistenceFailed {
        operation: &'static str,
        error: String,
    },
    /// A write succeeded but matched no row.
    NothingUpdated { operation: &'static str },
    /// Extraction succeeded but produced no frame files.
    EmptyFrames { kind: FrameKind, directory: String },
    /// A stage was not run because something it depends on failed.
    StageSkipped { stage: StageKind, reason: String },
    /// The pose predictions file is missing or malformed.
    PredictionsInvalid { error: String },
    /// Pose frames could not be listed after extraction.
    PoseFramesUnavailable { error: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::PersistenceFailed { operation, error } => {
                write!(f, "{} rolled back: {}", operation, error)
            }
            PipelineWarning::NothingUpdated { operation } => {
                write!(f, "{} matched no rows", operation)
            }
            PipelineWarning::EmptyFrames { kind, directory } => {
                write!(f, "no {} frames found in {}", kind.as_str(), directory)
            }
            PipelineWarning::StageSkipped { stage, reason } => {
                write!(f, "{} skipped: {}", stage, reason)
            }
            PipelineWarning::PredictionsInvalid { error } => {
                write!(f, "pose predictions unusable: {}", error)
            }
            PipelineWarning::PoseFramesUnavailable { error } => {
                write!(f, "pose frames unavailable: {}", error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frames_serializes_with_frame_kind() {
        let warning = PipelineWarning::EmptyFrames {
            kind: FrameKind::Pose,
            directory: "user_7/20250101_pose".to_string(),
        };

        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["warning"], "empty_frames");
        assert_eq!(value["directory"], "user_7/20250101_pose");
        assert_eq!(value["kind"], "pose");
    }

    #[test]
    fn test_warnings_serialize_to_tagged_objects() {
        let warnings = vec![
            PipelineWarning::NothingUpdated {
                operation: "history",
            },
            PipelineWarning::StageSkipped {
                stage: StageKind::ActionRecognition,
                reason: "pose estimation failed".to_string(),
            },
        ];

        let json = serde_json::to_string(&warnings).unwrap();
        assert!(json.contains(r#""warning":"nothing_updated""#));
        assert!(json.contains(r#""warning":"stage_skipped""#));
    }
}
