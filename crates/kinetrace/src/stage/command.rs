use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::StagesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Detection,
    FrameExtraction,
    PoseEstimation,
    ActionRecognition,
    PoseFrameExtraction,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Detection => "detection",
            StageKind::FrameExtraction => "frame_extraction",
            StageKind::PoseEstimation => "pose_estimation",
            StageKind::ActionRecognition => "action_recognition",
            StageKind::PoseFrameExtraction => "pose_frame_extraction",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-specified external process invocation for one stage.
#[derive(Debug, Clone)]
pub struct StageCommand {
    pub stage: StageKind,
    pub program: OsString,
    pub args: Vec<OsString>,
    pub working_directory: Option<PathBuf>,
    /// File (or directory, for frame extraction) the stage promises to produce.
    pub declared_output: PathBuf,
}

impl StageCommand {
    /// Renders the command line for log output.
    pub fn display_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builds stage commands from the configured scripts and models.
#[derive(Debug, Clone)]
pub struct StageCommands {
    stages: StagesConfig,
}

impl StageCommands {
    pub fn new(stages: StagesConfig) -> Self {
        Self { stages }
    }

    pub fn config(&self) -> &StagesConfig {
        &self.stages
    }

    pub fn action_recognition_enabled(&self) -> bool {
        self.stages
            .action_recognition
            .as_ref()
            .map(|a| a.enabled)
            .unwrap_or(false)
    }

    fn command(&self, stage: StageKind, script: &str, declared_output: &Path) -> StageCommand {
        StageCommand {
            stage,
            program: OsString::from(&self.stages.interpreter),
            args: vec![OsString::from(script)],
            working_directory: self.stages.working_directory.as_ref().map(PathBuf::from),
            declared_output: declared_output.to_path_buf(),
        }
    }

    /// `script --model_path M --video_path IN --video_out_path OUT`
    pub fn detection(&self, input: &Path, output: &Path) -> StageCommand {
        let cfg = &self.stages.detection;
        let mut cmd = self.command(StageKind::Detection, &cfg.script, output);
        push_flag(&mut cmd.args, "--model_path", &cfg.model);
        push_flag(&mut cmd.args, "--video_path", input);
        push_flag(&mut cmd.args, "--video_out_path", output);
        cmd
    }

    /// `script --video_path IN --output_dir DIR --frame_interval N`
    ///
    /// `stage` distinguishes original-frame from pose-frame extraction; both
    /// use the same script and contract.
    pub fn frame_extraction(&self, stage: StageKind, input: &Path, output_dir: &Path) -> StageCommand {
        let cfg = &self.stages.frame_extraction;
        let mut cmd = self.command(stage, &cfg.script, output_dir);
        push_flag(&mut cmd.args, "--video_path", input);
        push_flag(&mut cmd.args, "--output_dir", output_dir);
        push_flag(&mut cmd.args, "--frame_interval", cfg.interval.to_string());
        cmd
    }

    /// `script DET_CFG DET_W POSE_CFG POSE_W --input IN --output-root ROOT --device D [--save-predictions]`
    pub fn pose_estimation(&self, input: &Path, output_root: &Path, pose_video: &Path) -> StageCommand {
        let cfg = &self.stages.pose_estimation;
        let mut cmd = self.command(StageKind::PoseEstimation, &cfg.script, pose_video);
        cmd.args.extend(
            [
                &cfg.detector_config,
                &cfg.detector_weights,
                &cfg.pose_config,
                &cfg.pose_weights,
            ]
            .into_iter()
            .map(OsString::from),
        );
        push_flag(&mut cmd.args, "--input", input);
        push_flag(&mut cmd.args, "--output-root", output_root);
        push_flag(&mut cmd.args, "--device", &cfg.device);
        if cfg.save_predictions {
            cmd.args.push(OsString::from("--save-predictions"));
        }
        cmd
    }

    /// `script --config_path C --checkpoint_path K --label_map L --video_path IN --output_dir DIR --filename NAME`
    ///
    /// Returns `None` when action recognition is not configured or disabled.
    pub fn action_recognition(
        &self,
        input: &Path,
        output_dir: &Path,
        filename: &str,
    ) -> Option<StageCommand> {
        let cfg = self.stages.action_recognition.as_ref().filter(|a| a.enabled)?;
        let mut cmd = self.command(
            StageKind::ActionRecognition,
            &cfg.script,
            &output_dir.join(filename),
        );
        push_flag(&mut cmd.args, "--config_path", &cfg.config);
        push_flag(&mut cmd.args, "--checkpoint_path", &cfg.checkpoint);
        push_flag(&mut cmd.args, "--label_map", &cfg.label_map);
        push_flag(&mut cmd.args, "--video_path", input);
        push_flag(&mut cmd.args, "--output_dir", output_dir);
        push_flag(&mut cmd.args, "--filename", filename);
        Some(cmd)
    }
}

fn push_flag(args: &mut Vec<OsString>, flag: &str, value: impl AsRef<std::ffi::OsStr>) {
    args.push(OsString::from(flag));
    args.push(value.as_ref().to_os_string());
}
