//! In-memory backend used when Redis is unreachable.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{JobBackend, QueueMode};
use crate::error::QueueError;
use crate::job::Job;

#[derive(Default)]
struct MemoryState {
    pending: VecDeque<String>,
    jobs: HashMap<String, Job>,
}

/// Process-local job storage. State is lost on restart and the FIFO is only
/// ordered within this process.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty memory backend.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Number of pending ids.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobBackend for MemoryBackend {
    fn mode(&self) -> QueueMode {
        QueueMode::Memory
    }

    fn is_live(&self) -> bool {
        true
    }

    async fn push(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.job_id.clone(), job.clone());
        state.pending.push_back(job.job_id.clone());
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>, QueueError> {
        Ok(self.state.lock().await.pending.pop_front())
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.state.lock().await.jobs.get(job_id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.jobs.clear();
        debug!("In-memory queue cleared");
        Ok(())
    }
}
