use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub folders: FoldersConfig,
    /// SQLite database file. Falls back to `~/.kinetrace/data/kinetrace.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// How long an upload stays visible in the user's history.
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub stages: StagesConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_history_retention_days() -> u32 {
    30
}

/// Base folders; every run gets a `user_{id}` subtree below each of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldersConfig {
    pub upload: String,
    pub processed: String,
    pub pose: String,
    pub frames: String,
    pub results: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    /// Program used to launch every stage script.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Working directory for stage processes; relative script paths resolve against it.
    #[serde(default)]
    pub working_directory: Option<String>,
    pub detection: DetectionStageConfig,
    pub frame_extraction: FrameExtractionStageConfig,
    pub pose_estimation: PoseEstimationStageConfig,
    #[serde(default)]
    pub action_recognition: Option<ActionRecognitionStageConfig>,
}

fn default_interpreter() -> String {
    "python".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionStageConfig {
    pub script: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameExtractionStageConfig {
    pub script: String,
    /// Keep every n-th frame.
    #[serde(default = "default_frame_interval")]
    pub interval: u32,
}

fn default_frame_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseEstimationStageConfig {
    pub script: String,
    pub detector_config: String,
    pub detector_weights: String,
    pub pose_config: String,
    pub pose_weights: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_true")]
    pub save_predictions: bool,
}

fn default_device() -> String {
    "cuda:0".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecognitionStageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub script: String,
    pub config: String,
    pub checkpoint: String,
    pub label_map: String,
}
