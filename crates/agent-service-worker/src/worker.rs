//! Queue-draining worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agent_service_config::WorkerConfig;
use agent_service_queue::{Job, JobStatus, QueueStore};

use crate::error::WorkerError;
use crate::executor::CommandExecutor;
use crate::notifier::{HubNotifier, HubUpdate};

/// Pause after an empty dequeue.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(100);

struct WorkerInner {
    store: Arc<QueueStore>,
    executor: CommandExecutor,
    notifier: HubNotifier,
    poll_interval: Duration,
    idle_interval: Duration,
    running: AtomicBool,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

struct LoopHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Single consumer of the job queue. Runs one job at a time in dequeue
/// order and reports each terminal status to the Hub.
pub struct Worker {
    inner: Arc<WorkerInner>,
    handle: Mutex<Option<LoopHandle>>,
}

impl Worker {
    pub fn new(
        store: Arc<QueueStore>,
        executor: CommandExecutor,
        notifier: HubNotifier,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                store,
                executor,
                notifier,
                poll_interval: config.poll_interval(),
                idle_interval: IDLE_INTERVAL,
                running: AtomicBool::new(false),
                jobs_completed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Build the executor and notifier from `config`.
    pub fn from_config(store: Arc<QueueStore>, config: &WorkerConfig) -> Result<Self, WorkerError> {
        let executor = CommandExecutor::new(config.job_timeout())
            .with_output_limit(config.max_output_bytes);
        let notifier = HubNotifier::new(config.hub_url.clone(), config.notify_timeout())?;
        Ok(Self::new(store, executor, notifier, config))
    }

    /// Spawn the processing loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.task.is_finished()) {
            debug!("Worker already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.inner.clone().run(shutdown.clone()));
        *handle = Some(LoopHandle { shutdown, task });
    }

    /// Stop the loop and wait for the in-flight job, if any, to finish.
    pub async fn stop(&self) {
        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return;
        };

        info!("Stopping worker");
        handle.shutdown.cancel();
        if let Err(e) = handle.task.await {
            error!("Worker loop ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.inner.jobs_completed.load(Ordering::SeqCst)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.inner.jobs_failed.load(Ordering::SeqCst)
    }
}

impl WorkerInner {
    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        info!("Worker started");

        while !shutdown.is_cancelled() {
            if !self.store.is_healthy() {
                debug!(
                    "Queue not healthy, waiting {}ms",
                    self.poll_interval.as_millis()
                );
                pause(self.poll_interval, &shutdown).await;
                continue;
            }

            match self.store.dequeue().await {
                Ok(Some(job)) => self.clone().process(job).await,
                Ok(None) => pause(self.idle_interval, &shutdown).await,
                Err(e) => {
                    error!("Worker loop error: {}", e);
                    pause(self.poll_interval, &shutdown).await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Worker stopped");
    }

    /// Drive `job` to a terminal status and notify the Hub. The job runs in
    /// its own task so a panic ends in `failed` like any other error.
    async fn process(self: Arc<Self>, job: Job) {
        let job_id = job.job_id.clone();
        info!("Processing job {}: {}", job_id, job.command);

        let runner = self.clone();
        let (status, logs) = match tokio::spawn(async move { runner.execute(job).await }).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => self.force_failed(&job_id, e).await,
            Err(e) => self.force_failed(&job_id, aborted(e)).await,
        };

        match status {
            JobStatus::Completed => self.jobs_completed.fetch_add(1, Ordering::SeqCst),
            _ => self.jobs_failed.fetch_add(1, Ordering::SeqCst),
        };

        self.notifier
            .notify(&HubUpdate::new(job_id, status, logs))
            .await;
    }

    async fn execute(&self, job: Job) -> Result<(JobStatus, Vec<String>), WorkerError> {
        self.store
            .update_status(&job.job_id, JobStatus::Running, Vec::new())
            .await?;

        let result = self.executor.execute(&job.command).await;
        let status = if result.success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        self.store
            .update_status(&job.job_id, status, result.logs.clone())
            .await?;

        info!("Job {} completed with status: {}", job.job_id, status);
        Ok((status, result.logs))
    }

    async fn force_failed(&self, job_id: &str, err: WorkerError) -> (JobStatus, Vec<String>) {
        error!("Error processing job {}: {}", job_id, err);

        let logs = vec![format!("[system] Worker error: {}", err)];
        if let Err(e) = self
            .store
            .update_status(job_id, JobStatus::Failed, logs.clone())
            .await
        {
            warn!("Could not mark job {} as failed: {}", job_id, e);
        }
        (JobStatus::Failed, logs)
    }
}

async fn pause(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

fn aborted(err: JoinError) -> WorkerError {
    if !err.is_panic() {
        return WorkerError::Aborted(err.to_string());
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string());
    WorkerError::Aborted(message)
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
