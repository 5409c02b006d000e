pub mod broadcast;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod frames;
pub mod paths;
pub mod pipeline;
pub mod recorder;
pub mod sanitize;
pub mod skeleton;
pub mod stage;
pub mod telemetry;
pub mod worker;

pub use broadcast::{RunProgressBroadcaster, RunProgressEvent};
pub use config::{load_config, load_config_from_str, Config};
pub use context::AppContext;
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, EmptyDirectoryError, FilesystemError, KinetraceError, Result, SkeletonError,
    WorkerError,
};
pub use frames::{FrameError, FrameKind, FrameMaterializer, FrameRecord};
pub use paths::{FolderLayout, PathResolver, RunPaths};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, RunState};
pub use recorder::{Recorder, WriteOutcome};
pub use skeleton::PoseResults;
pub use stage::{ProcessRunner, StageFailure, StageInvoker, StageKind, SystemProcessRunner};
pub use worker::{Job, RunReport, WorkerPool};
