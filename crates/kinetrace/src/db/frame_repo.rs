//! Frame repository: `video_frames_process` (original frames) and
//! `video_frames_pose` (pose frames). Both tables share one shape and
//! differ only in the name of the path column.

use rusqlite::{params, Connection};
use serde::Serialize;

use super::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Original,
    Pose,
}

impl FrameKind {
    fn table(self) -> &'static str {
        match self {
            FrameKind::Original => "video_frames_process",
            FrameKind::Pose => "video_frames_pose",
        }
    }

    fn path_column(self) -> &'static str {
        match self {
            FrameKind::Original => "frame_path_process",
            FrameKind::Pose => "frame_path",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Original => "original",
            FrameKind::Pose => "pose",
        }
    }
}

/// One extracted frame. `frame_index` is 1-based and dense per video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub frame_id: String,
    pub video_id: String,
    pub frame_index: u32,
    /// Storage token relative to the frames base folder.
    pub frame_path: String,
}

impl FrameRecord {
    pub fn frame_id_for(video_id: &str, frame_index: u32) -> String {
        format!("{}_{}", video_id, frame_index)
    }
}

/// Replaces every frame row of `kind` for `video_id` with `frames`.
///
/// Run it inside a transaction so readers never observe a half-written set.
pub fn replace_for_video(
    conn: &Connection,
    kind: FrameKind,
    video_id: &str,
    frames: &[FrameRecord],
) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE video_id = ?1", kind.table()),
        params![video_id],
    )?;
    if removed > 0 {
        log::debug!(
            "Replacing {} existing {} frame rows for {}",
            removed,
            kind.as_str(),
            video_id
        );
    }

    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (frame_id, video_id, frame_index, {}) VALUES (?1, ?2, ?3, ?4)",
        kind.table(),
        kind.path_column()
    ))?;
    for frame in frames {
        stmt.execute(params![
            frame.frame_id,
            frame.video_id,
            frame.frame_index,
            frame.frame_path
        ])?;
    }
    Ok(frames.len())
}

/// Lists the frames of `kind` for `video_id` in index order.
pub fn list_for_video(
    conn: &Connection,
    kind: FrameKind,
    video_id: &str,
) -> Result<Vec<FrameRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT frame_id, video_id, frame_index, {} FROM {}
         WHERE video_id = ?1 ORDER BY frame_index",
        kind.path_column(),
        kind.table()
    ))?;
    let rows = stmt
        .query_map(params![video_id], |row| {
            Ok(FrameRecord {
                frame_id: row.get(0)?,
                video_id: row.get(1)?,
                frame_index: row.get(2)?,
                frame_path: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_for_video(conn: &Connection, kind: FrameKind, video_id: &str) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE video_id = ?1", kind.table()),
        params![video_id],
        |r| r.get(0),
    )?;
    Ok(count.max(0) as u64)
}
