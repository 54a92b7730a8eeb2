//! Application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_service_queue::QueueStore;

/// State shared across handlers.
pub struct AppState {
    pub store: Arc<QueueStore>,
    /// Port reported by `/test`.
    pub port: u16,
    start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<QueueStore>, port: u16) -> Self {
        Self {
            store,
            port,
            start_time: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
