//! Hub status callback.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use agent_service_queue::JobStatus;

use crate::error::WorkerError;

/// Terminal status report sent to the Hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub logs: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl HubUpdate {
    /// Create an update stamped with the current time.
    pub fn new(job_id: impl Into<String>, status: JobStatus, logs: Vec<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            logs,
            completed_at: Utc::now(),
        }
    }
}

/// Why a callback never got an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyFailure {
    ConnectionRefused,
    Timeout,
    Other(String),
}

impl std::fmt::Display for NotifyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyFailure::ConnectionRefused => {
                f.write_str("Hub server not available (connection refused)")
            }
            NotifyFailure::Timeout => f.write_str("Hub server timeout"),
            NotifyFailure::Other(message) => f.write_str(message),
        }
    }
}

/// Result of one callback attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The Hub answered 2xx.
    Delivered,
    /// The Hub answered with a non-2xx status.
    Rejected(u16),
    Failed(NotifyFailure),
}

impl NotifyOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Delivered)
    }
}

/// Posts job results to the Hub. Delivery is at most once; failures are
/// logged and never retried.
#[derive(Debug, Clone)]
pub struct HubNotifier {
    hub_url: String,
    client: reqwest::Client,
}

impl HubNotifier {
    /// Create a notifier whose requests give up after `timeout`.
    pub fn new(hub_url: impl Into<String>, timeout: Duration) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            hub_url: hub_url.into(),
            client,
        })
    }

    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }

    /// Send `update` once.
    pub async fn notify(&self, update: &HubUpdate) -> NotifyOutcome {
        debug!("Notifying Hub at {} for job {}", self.hub_url, update.job_id);

        let outcome = match self.client.post(&self.hub_url).json(update).send().await {
            Ok(response) if response.status().is_success() => NotifyOutcome::Delivered,
            Ok(response) => NotifyOutcome::Rejected(response.status().as_u16()),
            Err(e) => NotifyOutcome::Failed(classify(&e)),
        };

        match &outcome {
            NotifyOutcome::Delivered => {
                info!("Successfully notified Hub for job {}", update.job_id)
            }
            NotifyOutcome::Rejected(status) => warn!(
                "Failed to notify Hub for job {}: Hub responded with status {}",
                update.job_id, status
            ),
            NotifyOutcome::Failed(failure) => {
                warn!("Failed to notify Hub for job {}: {}", update.job_id, failure)
            }
        }
        outcome
    }
}

fn classify(err: &reqwest::Error) -> NotifyFailure {
    if err.is_timeout() {
        NotifyFailure::Timeout
    } else if err.is_connect() {
        NotifyFailure::ConnectionRefused
    } else {
        NotifyFailure::Other(err.to_string())
    }
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;
