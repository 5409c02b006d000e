//! Status repository: the `video_status` table.
//!
//! Status codes only ever move forward; a write that would lower the
//! stored code is a no-op.

use std::fmt;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatusCode {
    Uploaded = 0,
    Processing = 1,
    DetectionDone = 2,
    Completed = 3,
}

impl VideoStatusCode {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Uploaded),
            1 => Some(Self::Processing),
            2 => Some(Self::DetectionDone),
            3 => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for VideoStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::DetectionDone => "detection_done",
            Self::Completed => "completed",
        };
        write!(f, "{} ({})", label, self.code())
    }
}

pub fn insert(conn: &Connection, video_id: &str, status: VideoStatusCode) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO video_status (video_id, status, updated_at) VALUES (?1, ?2, ?3)",
        params![video_id, status.code(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Raises the stored status to `status` if it is currently lower.
///
/// Returns the number of rows changed: 0 when the row is missing or
/// already at or beyond `status`.
pub fn advance(conn: &Connection, video_id: &str, status: VideoStatusCode) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "UPDATE video_status SET status = ?2, updated_at = ?3
         WHERE video_id = ?1 AND status < ?2",
        params![video_id, status.code(), Utc::now().to_rfc3339()],
    )?;
    Ok(rows)
}

pub fn find(conn: &Connection, video_id: &str) -> Result<Option<VideoStatusCode>, DatabaseError> {
    let code: Option<i64> = conn
        .query_row(
            "SELECT status FROM video_status WHERE video_id = ?1",
            params![video_id],
            |r| r.get(0),
        )
        .optional()?;

    code.map(|c| {
        VideoStatusCode::from_code(c).ok_or_else(|| DatabaseError::InvalidValue {
            column: "video_status.status",
            value: c.to_string(),
        })
    })
    .transpose()
}
