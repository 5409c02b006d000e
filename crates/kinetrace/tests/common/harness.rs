//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` struct provides a complete isolated environment:
//! - Temporary base folders (upload, processed, pose, frames, results)
//! - A file-backed SQLite database with migrations applied
//! - A `ScriptedRunner` standing in for the external stage processes

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use kinetrace::config::Config;
use kinetrace::db::frame_repo::{self, FrameKind, FrameRecord};
use kinetrace::db::history_repo::{self, HistoryRow, HistoryStatus};
use kinetrace::db::status_repo::{self, VideoStatusCode};
use kinetrace::db::video_repo::{self, ProcessedVideoRow, VideoRow};
use kinetrace::pipeline::{ProgressEvent, ProgressReporter};
use kinetrace::stage::{ProcessOutput, ProcessRunner, StageCommand, StageKind};
use kinetrace::{
    AppContext, Database, Job, Pipeline, PipelineConfig, PipelineContext, RunReport,
    StageInvoker,
};

use super::builders::{predictions_json, ConfigBuilder};

/// How the scripted runner plays one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBehaviour {
    /// Exit 0 and write the declared output.
    Succeed,
    /// Like `Succeed`; frame stages write exactly this many images.
    Frames(usize),
    /// Exit with this code and write nothing.
    Fail(i32),
    /// Exit 0 without writing the declared output.
    ExitZeroWithoutOutput,
    /// The process cannot be started.
    SpawnError,
    /// Pose estimation writes its video but a truncated predictions file.
    MalformedPredictions,
}

/// Process runner that plays each stage from a script instead of starting
/// a real process.
pub struct ScriptedRunner {
    behaviours: Mutex<HashMap<StageKind, StageBehaviour>>,
    default_frames: usize,
    calls: Mutex<Vec<StageCommand>>,
}

impl ScriptedRunner {
    pub fn new(default_frames: usize) -> Self {
        Self {
            behaviours: Mutex::new(HashMap::new()),
            default_frames,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, stage: StageKind, behaviour: StageBehaviour) {
        self.behaviours.lock().unwrap().insert(stage, behaviour);
    }

    /// Stages started so far, in call order.
    pub fn stages(&self) -> Vec<StageKind> {
        self.calls.lock().unwrap().iter().map(|c| c.stage).collect()
    }

    pub fn commands(&self) -> Vec<StageCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn behaviour(&self, stage: StageKind) -> StageBehaviour {
        self.behaviours
            .lock()
            .unwrap()
            .get(&stage)
            .copied()
            .unwrap_or(StageBehaviour::Succeed)
    }

    fn produce(&self, command: &StageCommand, behaviour: StageBehaviour) -> std::io::Result<()> {
        let output = &command.declared_output;
        match command.stage {
            StageKind::FrameExtraction | StageKind::PoseFrameExtraction => {
                let count = match behaviour {
                    StageBehaviour::Frames(n) => n,
                    _ => self.default_frames,
                };
                std::fs::create_dir_all(output)?;
                for i in 1..=count {
                    std::fs::write(output.join(format!("frame_{:06}.jpg", i)), b"jpeg")?;
                }
            }
            StageKind::PoseEstimation => {
                write_file(output, b"pose video")?;
                if command.args.iter().any(|a| a == "--save-predictions") {
                    let stem = output
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let predictions = output.with_file_name(format!("results_{}.json", stem));
                    let content = if behaviour == StageBehaviour::MalformedPredictions {
                        "{ \"instance_info\": [".to_string()
                    } else {
                        predictions_json(self.default_frames)
                    };
                    write_file(&predictions, content.as_bytes())?;
                }
            }
            StageKind::ActionRecognition => {
                write_file(output, b"action video")?;
                let csv = output.with_extension("csv");
                write_file(&csv, b"label,score\nserve,0.91\n")?;
            }
            StageKind::Detection => write_file(output, b"detected video")?,
        }
        Ok(())
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, command: &StageCommand) -> std::io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(command.clone());

        let behaviour = self.behaviour(command.stage);
        match behaviour {
            StageBehaviour::SpawnError => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "python: command not found",
            )),
            StageBehaviour::Fail(code) => Ok(ProcessOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: format!("Traceback (most recent call last):\nRuntimeError: {} crashed", command.stage),
            }),
            StageBehaviour::ExitZeroWithoutOutput => Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            }),
            _ => {
                self.produce(command, behaviour)?;
                Ok(ProcessOutput {
                    exit_code: Some(0),
                    stdout: format!("{} done", command.stage),
                    stderr: String::new(),
                })
            }
        }
    }
}

fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}

/// Collects every progress event of a run.
#[derive(Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Test harness providing an isolated environment for integration tests.
pub struct TestHarness {
    /// Temporary directory holding every base folder and the database.
    temp_dir: TempDir,
    pub config: Config,
    pub database: Database,
    pub runner: Arc<ScriptedRunner>,
}

impl TestHarness {
    /// Create a harness with default settings (three frames per extraction).
    pub fn new() -> Self {
        Self::with_config(|builder| builder)
    }

    /// Create a harness whose config is adjusted by `configure`.
    pub fn with_config<F>(configure: F) -> Self
    where
        F: FnOnce(ConfigBuilder) -> ConfigBuilder,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(ConfigBuilder::new(temp_dir.path())).build();

        std::fs::create_dir_all(&config.folders.upload).expect("Failed to create upload dir");

        let db_path = PathBuf::from(config.database_path.as_ref().expect("database path"));
        let database = Database::open(&db_path).expect("Failed to open database");

        Self {
            temp_dir,
            config,
            database,
            runner: Arc::new(ScriptedRunner::new(3)),
        }
    }

    /// Get the base temp directory path.
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn frames_root(&self) -> PathBuf {
        PathBuf::from(&self.config.folders.frames)
    }

    pub fn processed_root(&self) -> PathBuf {
        PathBuf::from(&self.config.folders.processed)
    }

    pub fn pose_root(&self) -> PathBuf {
        PathBuf::from(&self.config.folders.pose)
    }

    pub fn results_root(&self) -> PathBuf {
        PathBuf::from(&self.config.folders.results)
    }

    /// Write an uploaded video to `upload/user_{id}/{filename}`.
    pub fn write_upload(&self, user_id: i64, filename: &str) -> PathBuf {
        let dir = Path::new(&self.config.folders.upload).join(format!("user_{}", user_id));
        std::fs::create_dir_all(&dir).expect("Failed to create upload user dir");
        let path = dir.join(filename);
        std::fs::write(&path, b"uploaded video").expect("Failed to write upload");
        path
    }

    /// Write an upload and return the job for it, without registering it.
    pub fn upload(&self, user_id: i64, video_id: &str, filename: &str) -> Job {
        let path = self.write_upload(user_id, filename);
        Job::new(path, filename, video_id, user_id)
    }

    /// Write an upload, register it and return the job for it.
    pub fn registered_upload(&self, user_id: i64, video_id: &str, filename: &str) -> Job {
        let job = self.upload(user_id, video_id, filename);
        self.register(&job);
        job
    }

    /// Record the upload the way the upload endpoint does: video row,
    /// processing status and a processing history entry.
    pub fn register(&self, job: &Job) {
        self.database
            .with_conn(|conn| {
                video_repo::insert_video(
                    conn,
                    &VideoRow {
                        video_id: job.video_id.clone(),
                        user_id: job.user_id,
                        video_path: format!("user_{}/{}", job.user_id, job.filename),
                        created_at: "2025-01-01T00:00:00+00:00".to_string(),
                    },
                )?;
                status_repo::insert(conn, &job.video_id, VideoStatusCode::Processing)?;
                history_repo::insert(
                    conn,
                    job.user_id,
                    &job.video_id,
                    HistoryStatus::Processing,
                    None,
                )?;
                Ok(())
            })
            .expect("Failed to register upload");
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::new(PipelineConfig::from_config(&self.config)),
            self.database.clone(),
            StageInvoker::new(self.runner.clone()),
        )
    }

    /// Run one job through a fresh pipeline.
    pub fn run(&self, job: Job) -> (RunReport, PipelineContext) {
        let progress = CollectingProgress::default();
        self.pipeline().run(PipelineContext::new(job), &progress)
    }

    /// Run one job and also return the progress events it emitted.
    pub fn run_collecting(&self, job: Job) -> (RunReport, PipelineContext, Vec<ProgressEvent>) {
        let progress = CollectingProgress::default();
        let (report, ctx) = self.pipeline().run(PipelineContext::new(job), &progress);
        (report, ctx, progress.events())
    }

    /// Build an application context over this harness's database and runner.
    pub fn app_context(&self) -> AppContext {
        AppContext::with_runner(self.config.clone(), self.database.clone(), self.runner.clone())
            .expect("Failed to build application context")
    }

    pub fn status(&self, video_id: &str) -> Option<VideoStatusCode> {
        self.database
            .with_conn(|conn| status_repo::find(conn, video_id))
            .expect("Failed to read status")
    }

    pub fn history(&self, video_id: &str) -> Option<HistoryRow> {
        self.database
            .with_conn(|conn| history_repo::find_latest(conn, video_id))
            .expect("Failed to read history")
    }

    pub fn video(&self, video_id: &str) -> Option<VideoRow> {
        self.database
            .with_conn(|conn| video_repo::find_video(conn, video_id))
            .expect("Failed to read video")
    }

    pub fn processed_video(&self, video_id: &str) -> Option<ProcessedVideoRow> {
        self.database
            .with_conn(|conn| video_repo::find_processed(conn, video_id))
            .expect("Failed to read processed video")
    }

    pub fn frames(&self, kind: FrameKind, video_id: &str) -> Vec<FrameRecord> {
        self.database
            .with_conn(|conn| frame_repo::list_for_video(conn, kind, video_id))
            .expect("Failed to read frames")
    }

    /// Image files directly inside `dir`, sorted by name.
    pub fn list_images(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|x| x == "jpg").unwrap_or(false))
            .collect();
        files.sort();
        files
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_creates_upload_dir_and_database() {
        let harness = TestHarness::new();

        assert!(Path::new(&harness.config.folders.upload).is_dir());
        assert!(harness.temp_path().join("kinetrace.db").exists());
    }

    #[test]
    fn test_write_upload_lands_in_user_dir() {
        let harness = TestHarness::new();
        let path = harness.write_upload(7, "serve.mp4");

        assert!(path.ends_with("input/user_7/serve.mp4"));
        assert!(path.is_file());
    }
}
