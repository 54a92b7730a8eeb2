//! Backend-agnostic job queue with durable-to-memory failover.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agent_service_config::QueueConfig;

use crate::backend::{JobBackend, QueueMode};
use crate::error::QueueError;
use crate::job::{Job, JobStatus};
use crate::memory::MemoryBackend;
use crate::redis_store::RedisBackend;

struct StoreState {
    mode: QueueMode,
    backend: Option<Arc<dyn JobBackend>>,
}

/// Job queue shared by the HTTP layer (producer) and the worker (consumer).
///
/// Starts in durable mode with no backend and reports unhealthy until
/// [`connect`](Self::connect) installs one. Once the connect retry budget is
/// exhausted the store switches to memory mode for the rest of its life.
pub struct QueueStore {
    config: QueueConfig,
    state: RwLock<StoreState>,
    connecting: Mutex<()>,
}

impl QueueStore {
    /// Create an unconnected store.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: RwLock::new(StoreState {
                mode: QueueMode::Durable,
                backend: None,
            }),
            connecting: Mutex::new(()),
        }
    }

    /// Create a store already serving from `backend`.
    pub fn with_backend(config: QueueConfig, backend: Arc<dyn JobBackend>) -> Self {
        Self {
            config,
            state: RwLock::new(StoreState {
                mode: backend.mode(),
                backend: Some(backend),
            }),
            connecting: Mutex::new(()),
        }
    }

    /// Create a store in memory mode.
    pub fn in_memory() -> Self {
        Self::with_backend(QueueConfig::default(), Arc::new(MemoryBackend::new()))
    }

    /// Establish the durable backend, retrying with exponential backoff and
    /// falling back to memory mode when every attempt fails.
    ///
    /// Never fails. Calling it again on a durable store whose connection
    /// dropped reconnects; on a healthy store it does nothing.
    pub async fn connect(&self) {
        let _guard = self.connecting.lock().await;

        if self.mode() == QueueMode::Memory {
            let mut state = self.state.write();
            if state.backend.is_none() {
                state.backend = Some(Arc::new(MemoryBackend::new()));
                info!("In-memory queue reinitialized");
            }
            return;
        }

        if self.is_healthy() {
            return;
        }

        let policy = &self.config.reconnect;
        for attempt in 0..policy.max_attempts {
            match RedisBackend::connect(&self.config).await {
                Ok(backend) => {
                    info!("Redis client connected and ready");
                    self.install(QueueMode::Durable, Arc::new(backend));
                    return;
                }
                Err(e) if attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "Redis connection attempt {} failed: {}; retrying in {}ms",
                        attempt + 1,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("Redis connection attempt {} failed: {}", attempt + 1, e);
                }
            }
        }

        warn!(
            "Redis connection failed after {} attempts, switching to memory mode",
            policy.max_attempts
        );
        self.install(QueueMode::Memory, Arc::new(MemoryBackend::new()));
    }

    fn install(&self, mode: QueueMode, backend: Arc<dyn JobBackend>) {
        let mut state = self.state.write();
        state.mode = mode;
        state.backend = Some(backend);
    }

    /// Reconnect whenever the durable connection is found down, until
    /// `shutdown` fires. Exhausting the retry budget fails over to memory.
    pub async fn supervise(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let dropped = {
                let state = self.state.read();
                state.mode == QueueMode::Durable
                    && state.backend.as_ref().is_some_and(|b| !b.is_live())
            };
            if dropped {
                warn!("Redis connection is down, reconnecting");
                self.connect().await;
            }
        }
        debug!("Queue supervisor stopped");
    }

    /// Memory mode is always healthy; durable mode needs a live connection.
    /// After [`close`](Self::close) the store is unhealthy in either mode
    /// until [`connect`](Self::connect) installs a backend again.
    pub fn is_healthy(&self) -> bool {
        self.state
            .read()
            .backend
            .as_ref()
            .is_some_and(|b| b.is_live())
    }

    pub fn mode(&self) -> QueueMode {
        self.state.read().mode
    }

    fn active(&self) -> Result<Arc<dyn JobBackend>, QueueError> {
        match &self.state.read().backend {
            Some(backend) if backend.is_live() => Ok(backend.clone()),
            Some(_) => Err(QueueError::unavailable("Redis connection not available")),
            None => Err(QueueError::unavailable("queue is not connected")),
        }
    }

    /// Add a new queued job, replacing any record with the same id.
    pub async fn enqueue(
        &self,
        job_id: impl Into<String>,
        command: impl Into<String>,
    ) -> Result<Job, QueueError> {
        let backend = self.active()?;
        let job = Job::new(job_id, command);

        backend.push(&job).await.map_err(|e| {
            error!("Failed to enqueue job {}: {}", job.job_id, e);
            e
        })?;

        info!("Job {} enqueued ({} mode)", job.job_id, backend.mode());
        Ok(job)
    }

    /// Take the oldest pending job, if any. Blocks up to one second in
    /// durable mode.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let backend = self.active()?;

        let Some(job_id) = backend.pop().await? else {
            return Ok(None);
        };

        match backend.load(&job_id).await? {
            Some(job) => {
                info!("Job {} dequeued for processing ({} mode)", job_id, backend.mode());
                Ok(Some(job))
            }
            None => {
                warn!("Job data not found for jobId: {}", job_id);
                Ok(None)
            }
        }
    }

    /// Record a lifecycle step. Unknown ids and illegal steps are ignored.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        logs: Vec<String>,
    ) -> Result<(), QueueError> {
        let backend = self.active()?;

        let Some(mut job) = backend.load(job_id).await? else {
            debug!("Status update for unknown job {} ignored", job_id);
            return Ok(());
        };

        if let Err(e) = job.transition(status, logs) {
            warn!("Job {}: {}, update ignored", job_id, e);
            return Ok(());
        }

        backend.save(&job).await.map_err(|e| {
            error!("Failed to update job {} status: {}", job_id, e);
            e
        })?;

        info!("Job {} status updated to: {} ({} mode)", job_id, status, backend.mode());
        Ok(())
    }

    /// Look up a job without touching the pending FIFO.
    pub async fn get_status(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        self.active()?.load(job_id).await
    }

    /// Release the backend. In memory mode all jobs are discarded.
    pub async fn close(&self) {
        let backend = self.state.write().backend.take();

        if let Some(backend) = backend {
            match backend.close().await {
                Ok(()) => info!("Queue closed ({} mode)", backend.mode()),
                Err(e) => error!("Error closing queue backend: {}", e),
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
