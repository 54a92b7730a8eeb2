//! Redis backend.
//!
//! Key layout:
//! ```text
//! job:{id}:data    hash   jobId, command, status, createdAt, startedAt,
//!                         completedAt, logs (JSON array)
//! job:{id}:status  string status, for cheap lookups
//! jobs:queue       list   pending ids, LPUSH on enqueue, BRPOP on dequeue
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use agent_service_config::QueueConfig;

use crate::backend::{JobBackend, QueueMode};
use crate::error::QueueError;
use crate::job::{Job, JobStatus};

/// Pending FIFO key.
pub const QUEUE_KEY: &str = "jobs:queue";

/// How long a dequeue blocks waiting for work.
pub const POP_TIMEOUT: Duration = Duration::from_secs(1);

pub fn data_key(job_id: &str) -> String {
    format!("job:{}:data", job_id)
}

pub fn status_key(job_id: &str) -> String {
    format!("job:{}:status", job_id)
}

/// Redis-backed job storage.
///
/// Blocking pops run on their own connection so they never hold up
/// enqueue or status calls multiplexed on the command connection.
pub struct RedisBackend {
    commands: MultiplexedConnection,
    blocking: MultiplexedConnection,
    live: AtomicBool,
    command_timeout: Duration,
}

impl RedisBackend {
    /// Open both connections and verify the server answers.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let command_timeout = config.command_timeout();
        let client = redis::Client::open(config.redis_url.as_str())?;

        let commands = Self::open(&client, command_timeout).await?;
        let blocking = Self::open(&client, command_timeout).await?;

        let mut conn = commands.clone();
        let pong: String = timeout(command_timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| QueueError::unavailable("Redis PING timed out"))??;
        debug!("Redis answered {}", pong);

        Ok(Self {
            commands,
            blocking,
            live: AtomicBool::new(true),
            command_timeout,
        })
    }

    async fn open(
        client: &redis::Client,
        limit: Duration,
    ) -> Result<MultiplexedConnection, QueueError> {
        timeout(limit, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| QueueError::unavailable("Redis connect timed out"))?
            .map_err(QueueError::from)
    }

    /// Run a Redis call under `limit`, marking the connection dead on
    /// I/O failures and timeouts.
    async fn bounded<T, F>(&self, limit: Duration, call: F) -> Result<T, QueueError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.fail(err)),
            Err(_) => {
                self.live.store(false, Ordering::SeqCst);
                error!("Redis call exceeded {:?}, marking connection down", limit);
                Err(QueueError::unavailable("Redis call timed out"))
            }
        }
    }

    fn fail(&self, err: RedisError) -> QueueError {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            self.live.store(false, Ordering::SeqCst);
            error!("Redis connection lost: {}", err);
        } else {
            warn!("Redis command failed: {}", err);
        }
        QueueError::from(err)
    }

    async fn write_record(&self, job: &Job, enqueue: bool) -> Result<(), QueueError> {
        let data_key = data_key(&job.job_id);
        let fields = encode_job(job);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&data_key)
            .ignore()
            .hset_multiple(&data_key, &fields)
            .ignore()
            .set(status_key(&job.job_id), job.status.as_str())
            .ignore();
        if enqueue {
            pipe.lpush(QUEUE_KEY, &job.job_id).ignore();
        }

        let mut conn = self.commands.clone();
        self.bounded(self.command_timeout, pipe.query_async(&mut conn))
            .await
    }
}

#[async_trait]
impl JobBackend for RedisBackend {
    fn mode(&self) -> QueueMode {
        QueueMode::Durable
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn push(&self, job: &Job) -> Result<(), QueueError> {
        self.write_record(job, true).await
    }

    async fn pop(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.blocking.clone();
        let popped: Option<(String, String)> = self
            .bounded(
                POP_TIMEOUT + self.command_timeout,
                conn.brpop(QUEUE_KEY, POP_TIMEOUT.as_secs_f64()),
            )
            .await?;
        Ok(popped.map(|(_, job_id)| job_id))
    }

    async fn load(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        let mut conn = self.commands.clone();
        let fields: HashMap<String, String> = self
            .bounded(self.command_timeout, conn.hgetall(data_key(job_id)))
            .await?;
        Ok(decode_job(job_id, &fields))
    }

    async fn save(&self, job: &Job) -> Result<(), QueueError> {
        self.write_record(job, false).await
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.live.store(false, Ordering::SeqCst);
        debug!("Redis backend closed");
        Ok(())
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Flatten a job into hash fields. Unset timestamps are omitted.
pub fn encode_job(job: &Job) -> Vec<(&'static str, String)> {
    let logs = serde_json::to_string(&job.logs).unwrap_or_else(|_| "[]".to_string());
    let mut fields = vec![
        ("jobId", job.job_id.clone()),
        ("command", job.command.clone()),
        ("status", job.status.as_str().to_string()),
        ("createdAt", format_time(&job.created_at)),
        ("logs", logs),
    ];
    if let Some(started) = &job.started_at {
        fields.push(("startedAt", format_time(started)));
    }
    if let Some(completed) = &job.completed_at {
        fields.push(("completedAt", format_time(completed)));
    }
    fields
}

/// Rebuild a job from hash fields. Missing or unreadable records are `None`.
pub fn decode_job(job_id: &str, fields: &HashMap<String, String>) -> Option<Job> {
    let stored_id = fields.get("jobId")?;

    let Some(status) = fields.get("status").and_then(|s| JobStatus::parse(s)) else {
        warn!("Job {} has an unreadable status field", job_id);
        return None;
    };
    let Some(created_at) = fields.get("createdAt").and_then(|s| parse_time(s)) else {
        warn!("Job {} has an unreadable createdAt field", job_id);
        return None;
    };
    let logs = match fields.get("logs") {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Job {} has unreadable logs: {}", job_id, e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    Some(Job {
        job_id: stored_id.clone(),
        command: fields.get("command").cloned().unwrap_or_default(),
        status,
        logs,
        created_at,
        started_at: fields.get("startedAt").and_then(|s| parse_time(s)),
        completed_at: fields.get("completedAt").and_then(|s| parse_time(s)),
    })
}

#[cfg(test)]
#[path = "redis_store_tests.rs"]
mod tests;
