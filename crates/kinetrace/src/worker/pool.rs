use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::broadcast::run_progress::RunProgressEvent;
use crate::db::Database;
use crate::error::WorkerError;
use crate::pipeline::progress::{BroadcastProgress, NoopProgress};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext};
use crate::stage::StageInvoker;
use crate::worker::job::{Job, RunReport};

/// Bounded queue of pending runs in front of a fixed set of worker threads.
///
/// Each worker handles one run at a time; stages within a run are
/// sequential, different runs proceed in parallel.
///
/// Finished reports wait in a backlog with one slot per run the pool can
/// hold at once (queued plus executing). When nobody collects them the
/// backlog fills and later reports are dropped; their outcome is still
/// published on the progress channel.
pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<RunReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    capacity: usize,
    report_backlog: usize,
}

/// Cloneable handle that stops workers from picking up new runs.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("Worker pool shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl WorkerPool {
    pub fn new(
        config: Arc<PipelineConfig>,
        database: Database,
        invoker: StageInvoker,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        Self::with_progress_sender(config, database, invoker, worker_count, None)
    }

    /// Creates a worker pool that also reports run progress on a broadcast channel.
    ///
    /// The queue holds `worker_count * 2` pending runs and the report
    /// backlog `worker_count * 3` finished ones.
    pub fn with_progress_sender(
        config: Arc<PipelineConfig>,
        database: Database,
        invoker: StageInvoker,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<RunProgressEvent>>>,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let capacity = worker_count * 2;
        let report_backlog = capacity + worker_count;
        let (job_sender, job_receiver) = bounded::<Job>(capacity);
        let (result_sender, result_receiver) = bounded::<RunReport>(report_backlog);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let pipeline = Pipeline::new(Arc::clone(&config), database.clone(), invoker.clone());
            let progress_sender = progress_sender.clone();

            let handle = thread::Builder::new()
                .name(format!("kinetrace-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        result_tx,
                        shutdown_flag,
                        pipeline,
                        progress_sender,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers (queue capacity {})", worker_count, capacity);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
            capacity,
            report_backlog,
        })
    }

    /// Queues a run, blocking while the queue is full.
    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Queues a run without blocking. A full queue is reported as
    /// [`WorkerError::QueueFull`].
    pub fn try_submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        match self.job_sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                warn!(
                    "Worker queue full, rejecting run for video {}",
                    job.video_id
                );
                Err(WorkerError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    pub fn try_recv_result(&self) -> Option<RunReport> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<RunReport> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<RunReport> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn pending(&self) -> usize {
        self.job_sender.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn report_backlog(&self) -> usize {
        self.report_backlog
    }

    /// Stops workers from starting queued runs. Runs already executing finish.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for the workers to exit.
    ///
    /// Without a prior [`shutdown`](Self::shutdown) every queued run is
    /// processed first. Returns the reports not yet received.
    pub fn wait(self) -> Vec<RunReport> {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
        self.result_receiver.try_iter().collect()
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<RunReport>,
    shutdown: Arc<AtomicBool>,
    pipeline: Pipeline,
    progress_sender: Option<Arc<broadcast::Sender<RunProgressEvent>>>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing video {}", worker_id, job.video_id);

                let report = if let Some(ref sender) = progress_sender {
                    let progress = BroadcastProgress::new(
                        &job.id,
                        &job.video_id,
                        job.user_id,
                        &job.filename,
                        Arc::clone(sender),
                    );
                    progress.queued();

                    let (report, _ctx) = pipeline.run(PipelineContext::new(job), &progress);
                    report
                } else {
                    let (report, _ctx) = pipeline.run(PipelineContext::new(job), &NoopProgress);
                    report
                };

                // Never block a worker on an uncollected report.
                match result_sender.try_send(report) {
                    Ok(()) => {}
                    Err(TrySendError::Full(report)) => {
                        debug!(
                            "Report backlog full, dropping report for video {}",
                            report.video_id
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        error!("Worker {} result channel disconnected", worker_id);
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
