//! Persistence bookkeeping for one pipeline run.
//!
//! Every method is one write group in its own transaction. A failed group
//! is rolled back and reported as a [`WriteOutcome`]; nothing here returns
//! an error to the caller.

use chrono::Utc;
use log::{error, info};
use rusqlite::Transaction;

use crate::db::frame_repo::{self, FrameKind, FrameRecord};
use crate::db::history_repo::{self, HistoryStatus};
use crate::db::status_repo::{self, VideoStatusCode};
use crate::db::video_repo::{self, ProcessedVideoRow};
use crate::db::{Database, DatabaseError, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed { rows: usize },
    RolledBack { error: String },
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed { .. })
    }

    /// Rows written, 0 for a rolled-back group.
    pub fn rows(&self) -> usize {
        match self {
            WriteOutcome::Committed { rows } => *rows,
            WriteOutcome::RolledBack { .. } => 0,
        }
    }
}

/// Holds the run's database session, opened on first write and closed
/// when the recorder is dropped.
pub struct Recorder {
    database: Database,
    session: Option<Session>,
}

impl Recorder {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            session: None,
        }
    }

    pub fn record_processed_video(
        &mut self,
        video_id: &str,
        user_id: i64,
        video_path_process: &str,
    ) -> WriteOutcome {
        let row = ProcessedVideoRow {
            video_id: video_id.to_string(),
            user_id,
            video_path_process: video_path_process.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        self.write("record processed video", video_id, |tx| {
            video_repo::upsert_processed(tx, &row)
        })
    }

    /// Replaces the stored frames of `kind` with `frames` in one group.
    pub fn record_frames(
        &mut self,
        kind: FrameKind,
        video_id: &str,
        frames: &[FrameRecord],
    ) -> WriteOutcome {
        let operation = match kind {
            FrameKind::Original => "record original frames",
            FrameKind::Pose => "record pose frames",
        };
        self.write(operation, video_id, |tx| {
            frame_repo::replace_for_video(tx, kind, video_id, frames)
        })
    }

    pub fn advance_status(&mut self, video_id: &str, status: VideoStatusCode) -> WriteOutcome {
        self.write("advance video status", video_id, |tx| {
            status_repo::advance(tx, video_id, status)
        })
    }

    pub fn mark_history(&mut self, video_id: &str, status: HistoryStatus) -> WriteOutcome {
        self.write("mark history", video_id, |tx| {
            history_repo::mark_latest(tx, video_id, status)
        })
    }

    fn write<F>(&mut self, operation: &'static str, video_id: &str, f: F) -> WriteOutcome
    where
        F: FnOnce(&Transaction<'_>) -> Result<usize, DatabaseError>,
    {
        let result = self.session().and_then(|session| session.transaction(f));
        match result {
            Ok(rows) => {
                info!("{} for {}: committed {} row(s)", operation, video_id, rows);
                WriteOutcome::Committed { rows }
            }
            Err(e) => {
                error!("{} for {} rolled back: {}", operation, video_id, e);
                WriteOutcome::RolledBack {
                    error: e.to_string(),
                }
            }
        }
    }

    fn session(&mut self) -> Result<&mut Session, DatabaseError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.database.session()?,
        };
        Ok(self.session.insert(session))
    }
}
