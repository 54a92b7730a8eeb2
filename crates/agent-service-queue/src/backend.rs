//! Storage backend trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::job::Job;

/// Which backend a [`QueueStore`](crate::QueueStore) is serving from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Redis.
    Durable,
    /// Process-local fallback.
    Memory,
}

impl QueueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMode::Durable => "durable",
            QueueMode::Memory => "memory",
        }
    }
}

impl std::fmt::Display for QueueMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job record table plus a FIFO of pending job ids.
///
/// Implementations must behave identically from the caller's point of view.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Backend kind.
    fn mode(&self) -> QueueMode;

    /// Whether the backend can currently serve requests.
    fn is_live(&self) -> bool;

    /// Replace the record for `job.job_id` and append the id to the FIFO.
    async fn push(&self, job: &Job) -> Result<(), QueueError>;

    /// Remove and return the oldest pending id.
    async fn pop(&self) -> Result<Option<String>, QueueError>;

    /// Load a record by id.
    async fn load(&self, job_id: &str) -> Result<Option<Job>, QueueError>;

    /// Replace a record without touching the FIFO.
    async fn save(&self, job: &Job) -> Result<(), QueueError>;

    /// Release resources. Memory backends drop all state.
    async fn close(&self) -> Result<(), QueueError>;
}
