//! Application context: everything a process needs to accept uploads and
//! run them, built once at startup and torn down explicitly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use log::info;
use tokio::sync::broadcast;

use crate::broadcast::{RunProgressBroadcaster, RunProgressEvent};
use crate::config::Config;
use crate::db::history_repo::{self, HistoryStatus};
use crate::db::status_repo::{self, VideoStatusCode};
use crate::db::video_repo::{self, VideoRow};
use crate::db::{default_database_path, Database};
use crate::error::{ConfigError, KinetraceError, Result};
use crate::paths::storage_token;
use crate::pipeline::PipelineConfig;
use crate::stage::{ProcessRunner, StageInvoker, SystemProcessRunner};
use crate::worker::{Job, RunReport, ShutdownHandle, WorkerPool};

pub struct AppContext {
    config: Arc<Config>,
    database: Database,
    pool: WorkerPool,
    progress: RunProgressBroadcaster,
}

impl AppContext {
    /// Opens the configured database and starts the worker pool with stages
    /// run as real child processes.
    pub fn init(config: Config) -> Result<Self> {
        let db_path = database_path(&config)?;
        let database = Database::open(&db_path)?;
        Self::with_runner(config, database, Arc::new(SystemProcessRunner))
    }

    /// Builds a context around an existing database and process runner.
    pub fn with_runner(
        config: Config,
        database: Database,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let pipeline_config = Arc::new(PipelineConfig::from_config(&config));
        let progress = RunProgressBroadcaster::default();
        let pool = WorkerPool::with_progress_sender(
            pipeline_config,
            database.clone(),
            StageInvoker::new(runner),
            config.worker_count,
            Some(progress.sender()),
        )?;

        info!(
            "Context ready: database {}, {} workers",
            database.location(),
            config.worker_count
        );

        Ok(Self {
            config: Arc::new(config),
            database,
            pool,
            progress,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Records a new upload: the video row, its status (processing) and a
    /// history entry, all in one transaction.
    pub fn register_upload(&self, job: &Job) -> Result<()> {
        let upload_root = Path::new(&self.config.folders.upload);
        let video = VideoRow {
            video_id: job.video_id.clone(),
            user_id: job.user_id,
            video_path: storage_token(upload_root, &job.input_path),
            created_at: Utc::now().to_rfc3339(),
        };
        let expiry = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(u64::from(self.config.history_retention_days)));

        let mut session = self.database.session()?;
        session.transaction(|tx| {
            video_repo::insert_video(tx, &video)?;
            status_repo::insert(tx, &video.video_id, VideoStatusCode::Processing)?;
            history_repo::insert(
                tx,
                video.user_id,
                &video.video_id,
                HistoryStatus::Processing,
                expiry,
            )?;
            Ok(())
        })?;

        info!("Registered upload {} for user {}", job.video_id, job.user_id);
        Ok(())
    }

    /// Queues a run and returns immediately. Fails with `QueueFull` when
    /// every slot is taken.
    ///
    /// Callers that never collect reports can rely on [`subscribe`](Self::subscribe)
    /// instead; uncollected reports beyond the backlog are dropped.
    pub fn dispatch(&self, job: Job) -> Result<()> {
        self.pool.try_submit(job)?;
        Ok(())
    }

    /// Queues a run, waiting for a free slot.
    pub fn dispatch_blocking(&self, job: Job) -> Result<()> {
        self.pool.submit(job)?;
        Ok(())
    }

    pub fn try_recv_report(&self) -> Option<RunReport> {
        self.pool.try_recv_result()
    }

    pub fn recv_report(&self) -> Option<RunReport> {
        self.pool.recv_result()
    }

    pub fn recv_report_timeout(&self, timeout: Duration) -> Option<RunReport> {
        self.pool.recv_result_timeout(timeout)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunProgressEvent> {
        self.progress.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.pool.shutdown_handle()
    }

    /// Marks history entries past their expiry date as expired.
    pub fn expire_history(&self) -> Result<usize> {
        let today = Utc::now().date_naive();
        let expired = self
            .database
            .with_conn(|conn| history_repo::expire_before(conn, today))?;
        if expired > 0 {
            info!("Expired {} history entries", expired);
        }
        Ok(expired)
    }

    /// Stops accepting runs, finishes the queued ones and returns the
    /// reports nobody collected, up to the pool's report backlog.
    pub fn shutdown(self) -> Vec<RunReport> {
        info!("Shutting down, draining {} queued run(s)", self.pool.pending());
        self.pool.wait()
    }
}

fn database_path(config: &Config) -> Result<PathBuf> {
    config
        .database_path
        .as_ref()
        .map(PathBuf::from)
        .or_else(default_database_path)
        .ok_or_else(|| {
            KinetraceError::Config(ConfigError::Validation {
                message: "database_path is not set and no home directory was found".to_string(),
            })
        })
}
