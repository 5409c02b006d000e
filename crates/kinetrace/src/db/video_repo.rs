//! Video repository: the `user_videos` and `user_videos_process` tables.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// An uploaded video, as registered by the upload handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRow {
    pub video_id: String,
    pub user_id: i64,
    pub video_path: String,
    pub created_at: String,
}

impl VideoRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            video_id: row.get("video_id")?,
            user_id: row.get("user_id")?,
            video_path: row.get("video_path")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// The detection output for an uploaded video. Shares the upload's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedVideoRow {
    pub video_id: String,
    pub user_id: i64,
    pub video_path_process: String,
    pub created_at: String,
}

impl ProcessedVideoRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            video_id: row.get("video_id")?,
            user_id: row.get("user_id")?,
            video_path_process: row.get("video_path_process")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert_video(conn: &Connection, video: &VideoRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO user_videos (video_id, user_id, video_path, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![video.video_id, video.user_id, video.video_path, video.created_at],
    )?;
    Ok(())
}

pub fn find_video(conn: &Connection, video_id: &str) -> Result<Option<VideoRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM user_videos WHERE video_id = ?1",
            params![video_id],
            VideoRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Inserts the processed-video row, replacing the path if a previous run
/// already recorded one. Returns the number of rows written.
pub fn upsert_processed(
    conn: &Connection,
    processed: &ProcessedVideoRow,
) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "INSERT INTO user_videos_process (video_id, user_id, video_path_process, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(video_id) DO UPDATE SET
             user_id = excluded.user_id,
             video_path_process = excluded.video_path_process",
        params![
            processed.video_id,
            processed.user_id,
            processed.video_path_process,
            processed.created_at,
        ],
    )?;
    Ok(rows)
}

pub fn find_processed(
    conn: &Connection,
    video_id: &str,
) -> Result<Option<ProcessedVideoRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM user_videos_process WHERE video_id = ?1",
            params![video_id],
            ProcessedVideoRow::from_row,
        )
        .optional()?;
    Ok(row)
}
