//! Job API handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use agent_service_queue::{Job, JobStatus, QueueMode};

use crate::error::ApiError;
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub queue: QueueHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    pub healthy: bool,
    pub mode: QueueMode,
}

/// Smoke test response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub config: TestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub port: u16,
    pub queue_mode: QueueMode,
    pub queue_healthy: bool,
}

/// Accepted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job status and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            logs: job.logs,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// `GET /health`. Always 200; queue trouble shows up in the body.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        queue: QueueHealth {
            healthy: state.store.is_healthy(),
            mode: state.store.mode(),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
    })
}

/// `GET /test`.
pub async fn smoke_test(State(state): State<Arc<AppState>>) -> Json<TestResponse> {
    Json(TestResponse {
        message: "Agent Service is running!".to_string(),
        timestamp: Utc::now(),
        config: TestConfig {
            port: state.port,
            queue_mode: state.store.mode(),
            queue_healthy: state.store.is_healthy(),
        },
    })
}

/// `POST /run`.
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let job_id = required_string(&body, "jobId")?;
    let command = required_string(&body, "command")?;

    if !state.store.is_healthy() {
        return Err(ApiError::Unavailable(
            "Redis connection not available".to_string(),
        ));
    }

    let job = state.store.enqueue(job_id, command).await.map_err(|e| {
        error!("Error submitting job: {}", e);
        ApiError::from(e)
    })?;

    info!("Job submitted: {} - {}", job.job_id, job.command);
    Ok(Json(RunResponse {
        job_id: job.job_id,
        status: job.status,
    }))
}

/// `GET /status/{job_id}`.
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !state.store.is_healthy() {
        return Err(ApiError::Unavailable(
            "Redis connection not available".to_string(),
        ));
    }

    let job = state
        .store
        .get_status(&job_id)
        .await
        .map_err(|e| {
            error!("Error getting job status: {}", e);
            ApiError::from(e)
        })?
        .ok_or_else(|| ApiError::JobNotFound(job_id.clone()))?;

    info!("Status requested for job: {} - {}", job_id, job.status);
    Ok(Json(job.into()))
}

/// A non-empty string field of a JSON object body.
fn required_string<'a>(body: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required and must be a string", field)))
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
