//! History repository: the `history` table.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Processing,
    Completed,
    Expired,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            other => Err(DatabaseError::InvalidValue {
                column: "history.status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub history_id: i64,
    pub user_id: i64,
    pub video_id: String,
    pub status: String,
    /// `YYYY-MM-DD`
    pub expiry: Option<String>,
    pub create_time: String,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            history_id: row.get("history_id")?,
            user_id: row.get("user_id")?,
            video_id: row.get("video_id")?,
            status: row.get("status")?,
            expiry: row.get("expiry")?,
            create_time: row.get("create_time")?,
        })
    }

    pub fn status(&self) -> Result<HistoryStatus, DatabaseError> {
        self.status.parse()
    }
}

/// Inserts a history entry and returns its id.
pub fn insert(
    conn: &Connection,
    user_id: i64,
    video_id: &str,
    status: HistoryStatus,
    expiry: Option<NaiveDate>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO history (user_id, video_id, status, expiry, create_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user_id,
            video_id,
            status.as_str(),
            expiry.map(|d| d.format("%Y-%m-%d").to_string()),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Sets the status of the most recent entry for `video_id`.
///
/// Returns the number of rows changed (0 when the upload has no history).
pub fn mark_latest(
    conn: &Connection,
    video_id: &str,
    status: HistoryStatus,
) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "UPDATE history SET status = ?2
         WHERE history_id = (
             SELECT history_id FROM history WHERE video_id = ?1
             ORDER BY history_id DESC LIMIT 1
         )",
        params![video_id, status.as_str()],
    )?;
    Ok(rows)
}

pub fn find_latest(conn: &Connection, video_id: &str) -> Result<Option<HistoryRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM history WHERE video_id = ?1 ORDER BY history_id DESC LIMIT 1",
            params![video_id],
            HistoryRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Marks every entry whose expiry date is before `today` as expired.
pub fn expire_before(conn: &Connection, today: NaiveDate) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "UPDATE history SET status = ?1
         WHERE expiry IS NOT NULL AND expiry < ?2 AND status != ?1",
        params![
            HistoryStatus::Expired.as_str(),
            today.format("%Y-%m-%d").to_string()
        ],
    )?;
    Ok(rows)
}
