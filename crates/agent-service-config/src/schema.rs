//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Lowest accepted job timeout.
pub const MIN_JOB_TIMEOUT_MS: u64 = 1_000;

/// Lowest accepted worker poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

/// Job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Durable backend connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Upper bound for any single backend command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Connect retry policy before falling back to memory mode.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl QueueConfig {
    /// Create a queue config for the given backend URL with default policy.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Default::default()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            command_timeout_ms: default_command_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_command_timeout() -> u64 {
    5_000
}

/// Exponential backoff policy for backend connection attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Failed attempts tolerated before switching to memory mode.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ReconnectConfig {
    /// Delay before the retry following failed attempt `attempt` (0-based):
    /// `base * 2^attempt`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay() -> u64 {
    50
}

fn default_max_delay() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    5
}

/// Background worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Hub callback endpoint.
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    #[serde(default = "default_job_timeout")]
    pub job_timeout_ms: u64,

    /// Wait between polls while the queue is unhealthy or after a loop error.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_ms: u64,

    /// Captured output per job; the command is terminated past this.
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
}

impl WorkerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            job_timeout_ms: default_job_timeout(),
            poll_interval_ms: default_poll_interval(),
            notify_timeout_ms: default_notify_timeout(),
            max_output_bytes: default_max_output(),
        }
    }
}

fn default_hub_url() -> String {
    "http://localhost:3000/hub/update-status".to_string()
}

fn default_job_timeout() -> u64 {
    300_000
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_notify_timeout() -> u64 {
    5_000
}

fn default_max_output() -> usize {
    1024 * 1024
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Optional directory for daily-rotated log files.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            directory: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
