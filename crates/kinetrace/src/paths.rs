//! Per-run path resolution.
//!
//! Every artifact a run produces lives below one of the configured base
//! folders, inside a `user_{id}/{video_id}` subtree, so two uploads with
//! the same filename never share an output file:
//!
//! ```text
//! processed/user_7/20250101/v.mp4         detection output
//! pose/user_7/20250101/v.mp4              pose-estimation video
//! pose/user_7/20250101/results_v.json     raw pose predictions
//! results/user_7/20250101/v.mp4           action-recognition video
//! results/user_7/20250101/v.csv           action-recognition predictions
//! frames/user_7/20250101/                 original frames
//! frames/user_7/20250101_pose/            pose frames
//! ```
//!
//! Paths written to the database are storage tokens relative to the base
//! folder (`user_7/20250101/frame_000001.jpg`), never absolute paths.

use std::path::{Component, Path, PathBuf};

use crate::config::FoldersConfig;
use crate::error::FilesystemError;
use crate::sanitize::ensure_component;

/// The base folders a resolver works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    pub processed: PathBuf,
    pub pose: PathBuf,
    pub frames: PathBuf,
    pub results: PathBuf,
}

impl FolderLayout {
    pub fn from_config(folders: &FoldersConfig) -> Self {
        Self {
            processed: PathBuf::from(&folders.processed),
            pose: PathBuf::from(&folders.pose),
            frames: PathBuf::from(&folders.frames),
            results: PathBuf::from(&folders.results),
        }
    }
}

/// Every path one pipeline run reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub processed_video: PathBuf,
    pub pose_dir: PathBuf,
    pub pose_video: PathBuf,
    pub pose_predictions: PathBuf,
    pub result_dir: PathBuf,
    pub action_video: PathBuf,
    pub action_csv: PathBuf,
    pub frames_dir: PathBuf,
    pub pose_frames_dir: PathBuf,
}

impl RunPaths {
    /// Directories that must exist before any stage runs.
    pub fn directories(&self) -> Vec<&Path> {
        let processed_dir = self
            .processed_video
            .parent()
            .unwrap_or(self.processed_video.as_path());
        vec![
            processed_dir,
            &self.pose_dir,
            &self.result_dir,
            &self.frames_dir,
            &self.pose_frames_dir,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    layout: FolderLayout,
}

impl PathResolver {
    pub fn new(layout: FolderLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    /// Computes the paths for one run without touching the filesystem.
    pub fn plan(
        &self,
        user_id: i64,
        video_id: &str,
        filename: &str,
    ) -> Result<RunPaths, FilesystemError> {
        ensure_component("video id", video_id)?;
        ensure_component("filename", filename)?;

        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FilesystemError::InvalidComponent {
                kind: "filename",
                value: filename.to_string(),
            })?;

        let user_dir = user_dir_name(user_id);

        let processed_dir = self.layout.processed.join(&user_dir).join(video_id);
        let pose_dir = self.layout.pose.join(&user_dir).join(video_id);
        let result_dir = self.layout.results.join(&user_dir).join(video_id);
        let frames_user_dir = self.layout.frames.join(&user_dir);

        Ok(RunPaths {
            processed_video: processed_dir.join(filename),
            pose_video: pose_dir.join(filename),
            pose_predictions: pose_dir.join(format!("results_{}.json", stem)),
            pose_dir,
            action_video: result_dir.join(filename),
            action_csv: result_dir.join(format!("{}.csv", stem)),
            result_dir,
            frames_dir: frames_user_dir.join(video_id),
            pose_frames_dir: frames_user_dir.join(format!("{}_pose", video_id)),
        })
    }

    /// Computes the paths for one run and creates every directory in them.
    ///
    /// Idempotent: the same inputs always produce the same paths, and
    /// existing directories are left untouched.
    pub fn resolve(
        &self,
        user_id: i64,
        video_id: &str,
        filename: &str,
    ) -> Result<RunPaths, FilesystemError> {
        let paths = self.plan(user_id, video_id, filename)?;
        for dir in paths.directories() {
            ensure_directory(dir)?;
        }
        Ok(paths)
    }
}

pub fn user_dir_name(user_id: i64) -> String {
    format!("user_{}", user_id)
}

fn ensure_directory(path: &Path) -> Result<(), FilesystemError> {
    if !path.is_dir() {
        std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Converts `path` into a `/`-separated token relative to `root`.
///
/// Falls back to the full path when `path` is not below `root`.
pub fn storage_token(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
