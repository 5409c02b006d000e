//! Frame materialization: run frame extraction into a directory, then turn
//! the directory listing into frame records.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::error::{EmptyDirectoryError, FilesystemError};
use crate::paths::storage_token;
use crate::stage::{StageCommands, StageFailure, StageInvoker, StageKind};

pub use crate::db::frame_repo::{FrameKind, FrameRecord};

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Stage(#[from] StageFailure),

    #[error(transparent)]
    Empty(#[from] EmptyDirectoryError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

pub struct FrameMaterializer {
    invoker: StageInvoker,
    commands: StageCommands,
    /// Base folder frame paths are recorded relative to.
    frames_root: PathBuf,
}

impl FrameMaterializer {
    pub fn new(invoker: StageInvoker, commands: StageCommands, frames_root: PathBuf) -> Self {
        Self {
            invoker,
            commands,
            frames_root,
        }
    }

    /// Extracts frames from `source` into `target_dir` and returns one
    /// record per frame file, in frame order.
    pub fn materialize(
        &self,
        kind: FrameKind,
        source: &Path,
        target_dir: &Path,
        video_id: &str,
    ) -> Result<Vec<FrameRecord>, FrameError> {
        let stage = match kind {
            FrameKind::Original => StageKind::FrameExtraction,
            FrameKind::Pose => StageKind::PoseFrameExtraction,
        };

        if !source.is_file() {
            return Err(StageFailure::missing_input(stage, source.to_path_buf()).into());
        }

        let command = self.commands.frame_extraction(stage, source, target_dir);
        self.invoker.invoke(&command)?;

        let frames = enumerate_frames(target_dir, &self.frames_root, video_id)?;
        if frames.is_empty() {
            warn!(
                "{} frame extraction succeeded but {} holds no frames",
                kind.as_str(),
                target_dir.display()
            );
            return Err(EmptyDirectoryError {
                directory: target_dir.to_path_buf(),
            }
            .into());
        }

        info!("Materialized {} {} frames for {}", frames.len(), kind.as_str(), video_id);
        Ok(frames)
    }
}

/// Lists the frame images directly inside `dir` in lexicographic filename
/// order and numbers them from 1.
///
/// Extraction names files with zero-padded counters, so filename order is
/// frame order.
pub fn enumerate_frames(
    dir: &Path,
    frames_root: &Path,
    video_id: &str,
) -> Result<Vec<FrameRecord>, FilesystemError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| FilesystemError::ReadDirectory {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() || !is_frame_image(entry.path()) {
            debug!("Skipping non-frame entry {}", entry.path().display());
            continue;
        }
        files.push(entry.into_path());
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(files
        .iter()
        .zip(1u32..)
        .map(|(path, index)| FrameRecord {
            frame_id: FrameRecord::frame_id_for(video_id, index),
            video_id: video_id.to_string(),
            frame_index: index,
            frame_path: storage_token(frames_root, path),
        })
        .collect())
}

fn is_frame_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| FRAME_EXTENSIONS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
        .unwrap_or(false)
}
