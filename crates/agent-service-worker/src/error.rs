//! Worker errors.

use thiserror::Error;

use agent_service_queue::QueueError;

/// Worker error types.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The Hub HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A queue call failed while processing a job.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The processing task died before finishing.
    #[error("Job processing aborted: {0}")]
    Aborted(String),
}
