use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KinetraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Skeleton data error: {0}")]
    Skeleton(#[from] SkeletonError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] crate::telemetry::TelemetryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Directory or file access failures. Fatal to the run that hits them.
#[derive(Error, Debug)]
pub enum FilesystemError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {kind} '{value}': must be a single non-empty path component")]
    InvalidComponent { kind: &'static str, value: String },
}

/// Frame extraction reported success but left no frame images behind.
#[derive(Error, Debug)]
#[error("No frame images found in '{directory}'")]
pub struct EmptyDirectoryError {
    pub directory: PathBuf,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full ({capacity} pending runs)")]
    QueueFull { capacity: usize },
}

#[derive(Error, Debug)]
pub enum SkeletonError {
    #[error("Failed to read pose results '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed pose results JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid instance {instance} in frame {frame_id}: {reason}")]
    InvalidInstance {
        frame_id: u64,
        instance: usize,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, KinetraceError>;
