//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite). `Database` is a cheap, cloneable handle that
//! knows where the database lives; every unit of work opens its own
//! [`Session`], which closes its connection when dropped.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction};

pub mod error;
pub mod frame_repo;
pub mod history_repo;
pub mod migrations;
pub mod status_repo;
pub mod video_repo;

pub use error::DatabaseError;

/// How long a session waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database. The anchor connection keeps it
    /// alive for as long as any handle exists.
    Memory {
        uri: String,
        _anchor: Mutex<Connection>,
    },
}

/// Thread-safe handle to the database. Cloning is cheap (inner `Arc`).
#[derive(Clone)]
pub struct Database {
    target: Arc<Target>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            target: Arc::new(Target::File(path.to_path_buf())),
        })
    }

    /// Opens a private in-memory database for testing. Runs all migrations.
    ///
    /// Sessions opened from this handle (and its clones) all see the same
    /// data; other in-memory databases are unaffected.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let uri = format!(
            "file:kinetrace-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        );
        let anchor = open_connection(&uri)?;
        migrations::run_all(&anchor)?;

        Ok(Self {
            target: Arc::new(Target::Memory {
                uri,
                _anchor: Mutex::new(anchor),
            }),
        })
    }

    /// Opens a new session with its own connection.
    pub fn session(&self) -> Result<Session, DatabaseError> {
        let conn = match self.target.as_ref() {
            Target::File(path) => {
                let conn = Connection::open(path)?;
                configure(&conn)?;
                conn
            }
            Target::Memory { uri, .. } => open_connection(uri)?,
        };
        log::debug!("Database session opened");
        Ok(Session { conn })
    }

    /// Runs `f` on a short-lived session.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        self.session()?.with_conn(f)
    }

    /// Human-readable location, for log output.
    pub fn location(&self) -> String {
        match self.target.as_ref() {
            Target::File(path) => path.display().to_string(),
            Target::Memory { .. } => ":memory:".to_string(),
        }
    }
}

fn open_connection(uri: &str) -> Result<Connection, DatabaseError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(uri, flags)?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

/// One connection, owned by a single unit of work.
///
/// The connection is closed when the session is dropped, whether the
/// work finished or bailed out early.
pub struct Session {
    conn: Connection,
}

impl Session {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        f(&self.conn)
    }

    /// Runs `f` inside a transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn transaction<F, T>(&mut self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log::debug!("Database session released");
    }
}

/// Returns the canonical database path: `~/.kinetrace/data/kinetrace.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".kinetrace").join("data").join("kinetrace.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration_count(conn: &Connection) -> Result<u32, DatabaseError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?)
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count = db.with_conn(migration_count).unwrap();
        assert_eq!(count, migrations::latest_version());
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        assert!(db.with_conn(migration_count).unwrap() > 0);
        assert!(path.exists());
        assert_eq!(db.location(), path.display().to_string());
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with("kinetrace.db"));
        assert!(path.to_string_lossy().contains(".kinetrace"));
    }

    #[test]
    fn test_sessions_share_in_memory_data() {
        let db = Database::open_in_memory().unwrap();
        let writer = db.session().unwrap();
        writer
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO user_videos (video_id, user_id, video_path, created_at)
                     VALUES ('v1', 1, 'user_1/v.mp4', '2025-01-01')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        drop(writer);

        let count: u32 = db
            .clone()
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM user_videos", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_in_memory_databases_are_isolated() {
        let a = Database::open_in_memory().unwrap();
        let b = Database::open_in_memory().unwrap();
        a.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_videos (video_id, user_id, video_path, created_at)
                 VALUES ('v1', 1, 'p', 't')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let count: u32 = b
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM user_videos", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let mut session = db.session().unwrap();

        let result: Result<(), DatabaseError> = session.transaction(|tx| {
            tx.execute(
                "INSERT INTO user_videos (video_id, user_id, video_path, created_at)
                 VALUES ('v1', 1, 'p', 't')",
                [],
            )?;
            // Violates the foreign key and aborts the group.
            tx.execute(
                "INSERT INTO video_status (video_id, status, updated_at) VALUES ('missing', 1, 't')",
                [],
            )?;
            Ok(())
        });
        assert!(result.is_err());

        let count: u32 = session
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM user_videos", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
