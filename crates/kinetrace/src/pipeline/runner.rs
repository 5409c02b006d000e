use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use crate::db::frame_repo::FrameKind;
use crate::db::history_repo::HistoryStatus;
use crate::db::status_repo::VideoStatusCode;
use crate::db::Database;
use crate::frames::{FrameError, FrameMaterializer};
use crate::paths::{storage_token, PathResolver, RunPaths};
use crate::recorder::{Recorder, WriteOutcome};
use crate::sanitize;
use crate::skeleton::PoseResults;
use crate::stage::{StageCommand, StageCommands, StageFailure, StageInvoker, StageKind};
use crate::worker::job::RunReport;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter};
use super::state::RunState;

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    resolver: PathResolver,
    commands: StageCommands,
    invoker: StageInvoker,
    materializer: FrameMaterializer,
    database: Database,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, database: Database, invoker: StageInvoker) -> Self {
        let resolver = PathResolver::new(config.layout.clone());
        let commands = StageCommands::new(config.stages.clone());
        let materializer = FrameMaterializer::new(
            invoker.clone(),
            commands.clone(),
            config.layout.frames.clone(),
        );

        Self {
            config,
            resolver,
            commands,
            invoker,
            materializer,
            database,
        }
    }

    /// Runs every stage for one uploaded video.
    ///
    /// Never fails: aborts and stage failures are recorded in the returned
    /// report and context.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (RunReport, PipelineContext) {
        let started_at = Utc::now();
        let input = sanitize::redact_path(&ctx.job.input_path);
        let _pipeline_span = info_span!("pipeline",
            job_id = %ctx.job.id,
            video_id = %ctx.job.video_id,
            user_id = ctx.job.user_id,
            input = %input,
            input_hash = %sanitize::hash_path(&ctx.job.input_path),
        )
        .entered();

        // Dropped at the end of this function, closing the run's session.
        let mut recorder = Recorder::new(self.database.clone());

        match self.execute(&mut ctx, &mut recorder, progress) {
            Ok(()) => {
                info!(
                    "Run completed: {} original frames, {} pose frames, {} stage failure(s), {} warning(s)",
                    ctx.original_frames.len(),
                    ctx.pose_frames.len(),
                    ctx.failures.len(),
                    ctx.warnings.len()
                );
                progress.report(ProgressEvent::Completed {
                    original_frames: ctx.original_frames.len(),
                    pose_frames: ctx.pose_frames.len(),
                    warnings: ctx.warnings.iter().map(|w| w.to_string()).collect(),
                });
            }
            Err(e) => {
                let reason = e.to_string();
                let state = ctx.state;
                error!("Run aborted while {}: {}", state, reason);
                ctx.abort(reason.clone());
                progress.report(ProgressEvent::Aborted {
                    state,
                    error: reason,
                });
            }
        }

        let report = RunReport::from_context(&ctx, started_at);
        (report, ctx)
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        recorder: &mut Recorder,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        // Resolve paths
        let paths = {
            let _step = info_span!("resolve_paths").entered();
            self.step_resolve_paths(ctx)?
        };

        // Stage 1: Detection
        {
            let _step = info_span!("detection").entered();
            enter(ctx, progress, RunState::Detecting, "Running object detection...");
            self.step_detect(ctx, recorder, &paths)?;
            enter(ctx, progress, RunState::Detected, "Detection finished");
        }

        // Stage 2: Frame extraction
        {
            let _step = info_span!("frame_extraction").entered();
            enter(ctx, progress, RunState::ExtractingFrames, "Extracting frames...");
            self.step_extract_frames(ctx, recorder, &paths)?;
            enter(ctx, progress, RunState::FramesExtracted, "Frames extracted");
        }

        // Stage 3: Pose estimation
        {
            let _step = info_span!("pose_estimation").entered();
            enter(ctx, progress, RunState::EstimatingPose, "Estimating pose...");
            self.step_estimate_pose(ctx, &paths);
            if ctx.pose_succeeded {
                enter(ctx, progress, RunState::PoseEstimated, "Pose estimated");
            }
        }

        if ctx.pose_succeeded {
            // Stage 4: Action recognition (optional)
            let action = self.commands.action_recognition(
                &paths.pose_video,
                &paths.result_dir,
                &ctx.job.filename,
            );
            if let Some(command) = action {
                let _step = info_span!("action_recognition").entered();
                enter(ctx, progress, RunState::RecognizingAction, "Recognizing action...");
                self.step_recognize_action(ctx, &command, &paths);
            }

            // Stage 5: Pose frame extraction
            {
                let _step = info_span!("pose_frame_extraction").entered();
                self.step_extract_pose_frames(ctx, recorder, progress, &paths);
            }
        }

        // Terminal writes
        {
            let _step = info_span!("finalize").entered();
            self.step_finalize(ctx, recorder);
            enter(ctx, progress, RunState::Completed, "Processing completed");
        }

        Ok(())
    }

    fn step_resolve_paths(&self, ctx: &mut PipelineContext) -> Result<RunPaths, PipelineError> {
        let paths = self
            .resolver
            .resolve(ctx.job.user_id, &ctx.job.video_id, &ctx.job.filename)?;
        debug!("Resolved run paths: {:?}", paths);
        ctx.paths = Some(paths.clone());
        Ok(paths)
    }

    fn step_detect(
        &self,
        ctx: &mut PipelineContext,
        recorder: &mut Recorder,
        paths: &RunPaths,
    ) -> Result<(), PipelineError> {
        let input = ctx.job.input_path.clone();
        let command = self.commands.detection(&input, &paths.processed_video);
        self.invoke_checked(ctx, &command, &input)?;

        let video_id = ctx.job.video_id.clone();
        let token = storage_token(&self.config.layout.processed, &paths.processed_video);

        let outcome = recorder.record_processed_video(&video_id, ctx.job.user_id, &token);
        note_write(ctx, "record processed video", outcome);

        let outcome = recorder.advance_status(&video_id, VideoStatusCode::DetectionDone);
        note_write(ctx, "advance status to detection done", outcome);

        Ok(())
    }

    fn step_extract_frames(
        &self,
        ctx: &mut PipelineContext,
        recorder: &mut Recorder,
        paths: &RunPaths,
    ) -> Result<(), PipelineError> {
        let video_id = ctx.job.video_id.clone();

        match self.materializer.materialize(
            FrameKind::Original,
            &paths.processed_video,
            &paths.frames_dir,
            &video_id,
        ) {
            Ok(frames) => {
                let outcome = recorder.record_frames(FrameKind::Original, &video_id, &frames);
                note_write(ctx, "record original frames", outcome);
                ctx.original_frames = frames;
                Ok(())
            }
            Err(FrameError::Empty(e)) => {
                warn!("{}", e);
                ctx.warn(PipelineWarning::EmptyFrames {
                    kind: FrameKind::Original,
                    directory: storage_token(&self.config.layout.frames, &e.directory),
                });
                Ok(())
            }
            Err(FrameError::Stage(failure)) => {
                ctx.failures.push(failure.clone());
                Err(failure.into())
            }
            Err(FrameError::Filesystem(e)) => Err(e.into()),
        }
    }

    fn step_estimate_pose(&self, ctx: &mut PipelineContext, paths: &RunPaths) {
        let command = self.commands.pose_estimation(
            &paths.processed_video,
            &paths.pose_dir,
            &paths.pose_video,
        );

        match self.invoke_checked(ctx, &command, &paths.processed_video) {
            Ok(()) => {
                ctx.pose_succeeded = true;
                if self.config.stages.pose_estimation.save_predictions {
                    self.check_predictions(ctx, paths);
                }
            }
            Err(failure) => {
                warn!("Pose estimation failed, skipping pose-dependent stages: {}", failure);
                if self.commands.action_recognition_enabled() {
                    ctx.warn(PipelineWarning::StageSkipped {
                        stage: StageKind::ActionRecognition,
                        reason: "pose estimation failed".to_string(),
                    });
                }
                ctx.warn(PipelineWarning::StageSkipped {
                    stage: StageKind::PoseFrameExtraction,
                    reason: "pose estimation failed".to_string(),
                });
            }
        }
    }

    fn check_predictions(&self, ctx: &mut PipelineContext, paths: &RunPaths) {
        match PoseResults::load(&paths.pose_predictions) {
            Ok(results) => {
                info!(
                    "Pose predictions: {} frames, {} instances",
                    results.frame_count(),
                    results.instance_count()
                );
            }
            Err(e) => {
                warn!(
                    "Pose predictions {} unusable: {}",
                    sanitize::redact_path(&paths.pose_predictions),
                    e
                );
                ctx.warn(PipelineWarning::PredictionsInvalid {
                    error: e.to_string(),
                });
            }
        }
    }

    fn step_recognize_action(
        &self,
        ctx: &mut PipelineContext,
        command: &StageCommand,
        paths: &RunPaths,
    ) {
        // Failure here never changes the outcome of the run.
        match self.invoke_checked(ctx, command, &paths.pose_video) {
            Ok(()) => {
                if !paths.action_csv.is_file() {
                    debug!(
                        "Action recognition wrote no predictions file {}",
                        sanitize::redact_path(&paths.action_csv)
                    );
                }
            }
            Err(failure) => warn!("Action recognition failed, continuing: {}", failure),
        }
    }

    fn step_extract_pose_frames(
        &self,
        ctx: &mut PipelineContext,
        recorder: &mut Recorder,
        progress: &dyn ProgressReporter,
        paths: &RunPaths,
    ) {
        let video_id = ctx.job.video_id.clone();

        enter(
            ctx,
            progress,
            RunState::ExtractingPoseFrames,
            "Extracting pose frames...",
        );

        match self.materializer.materialize(
            FrameKind::Pose,
            &paths.pose_video,
            &paths.pose_frames_dir,
            &video_id,
        ) {
            Ok(frames) => {
                let outcome = recorder.record_frames(FrameKind::Pose, &video_id, &frames);
                note_write(ctx, "record pose frames", outcome);
                ctx.pose_frames = frames;
                enter(ctx, progress, RunState::PoseFramesExtracted, "Pose frames extracted");
            }
            Err(FrameError::Empty(e)) => {
                warn!("{}", e);
                ctx.warn(PipelineWarning::EmptyFrames {
                    kind: FrameKind::Pose,
                    directory: storage_token(&self.config.layout.frames, &e.directory),
                });
                enter(ctx, progress, RunState::PoseFramesExtracted, "No pose frames found");
            }
            Err(FrameError::Stage(failure)) => {
                warn!("Pose frame extraction failed, continuing: {}", failure);
                ctx.failures.push(failure);
            }
            Err(FrameError::Filesystem(e)) => {
                warn!("Pose frames could not be listed: {}", e);
                ctx.warn(PipelineWarning::PoseFramesUnavailable {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Status and history are committed in separate transactions; either
    /// may fail without undoing the other.
    fn step_finalize(&self, ctx: &mut PipelineContext, recorder: &mut Recorder) {
        let video_id = ctx.job.video_id.clone();

        let status = recorder.advance_status(&video_id, VideoStatusCode::Completed);
        let status_ok = note_write(ctx, "advance status to completed", status);

        let history = recorder.mark_history(&video_id, HistoryStatus::Completed);
        let history_updated = history.rows() > 0;
        let history_ok = note_write(ctx, "mark history completed", history);
        if history_ok && !history_updated {
            ctx.warn(PipelineWarning::NothingUpdated {
                operation: "mark history completed",
            });
        }

        ctx.terminal_written = status_ok && history_ok;
    }

    /// Runs a stage after re-checking that its input exists on disk.
    /// Failures are appended to the context and returned.
    fn invoke_checked(
        &self,
        ctx: &mut PipelineContext,
        command: &StageCommand,
        input: &std::path::Path,
    ) -> Result<(), StageFailure> {
        let result = if input.is_file() {
            self.invoker.invoke(command).map(|_| ())
        } else {
            error!(
                "{} input {} is missing",
                command.stage,
                sanitize::redact_path(input)
            );
            Err(StageFailure::missing_input(command.stage, input.to_path_buf()))
        };

        if let Err(failure) = &result {
            ctx.failures.push(failure.clone());
        }
        result
    }
}

fn enter(
    ctx: &mut PipelineContext,
    progress: &dyn ProgressReporter,
    state: RunState,
    message: &str,
) {
    ctx.advance(state);
    progress.report(ProgressEvent::Phase {
        state,
        message: message.to_string(),
    });
}

/// Records a rolled-back write as a warning. Returns whether it committed.
fn note_write(ctx: &mut PipelineContext, operation: &'static str, outcome: WriteOutcome) -> bool {
    match outcome {
        WriteOutcome::Committed { .. } => true,
        WriteOutcome::RolledBack { error } => {
            ctx.warn(PipelineWarning::PersistenceFailed { operation, error });
            false
        }
    }
}
