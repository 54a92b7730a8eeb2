//! Queue errors.

use thiserror::Error;

/// Queue error types.
///
/// Lookups of unknown jobs are `Ok(None)`, not errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The store cannot serve the request: not connected, connection
    /// dropped, or a backend call failed or timed out.
    #[error("Queue not available: {0}")]
    Unavailable(String),
}

impl QueueError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        QueueError::Unavailable(reason.into())
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(format!("Redis error: {}", err))
    }
}
