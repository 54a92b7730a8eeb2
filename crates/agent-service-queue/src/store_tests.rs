use super::*;

use std::collections::VecDeque;
use std::time::Instant;

use async_trait::async_trait;

/// Nothing listens on port 1, so every connect is refused immediately.
const REFUSED_URL: &str = "redis://127.0.0.1:1";

fn refused_config(base_delay_ms: u64) -> QueueConfig {
    let mut config = QueueConfig::new(REFUSED_URL);
    config.command_timeout_ms = 500;
    config.reconnect.base_delay_ms = base_delay_ms;
    config.reconnect.max_delay_ms = 3_000;
    config.reconnect.max_attempts = 5;
    config
}

/// Durable backend whose connection has dropped.
struct DeadBackend;

#[async_trait]
impl JobBackend for DeadBackend {
    fn mode(&self) -> QueueMode {
        QueueMode::Durable
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn push(&self, _job: &Job) -> Result<(), QueueError> {
        Err(QueueError::unavailable("dead"))
    }

    async fn pop(&self) -> Result<Option<String>, QueueError> {
        Err(QueueError::unavailable("dead"))
    }

    async fn load(&self, _job_id: &str) -> Result<Option<Job>, QueueError> {
        Err(QueueError::unavailable("dead"))
    }

    async fn save(&self, _job: &Job) -> Result<(), QueueError> {
        Err(QueueError::unavailable("dead"))
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Pending ids whose records were never written.
struct OrphanBackend {
    pending: Mutex<VecDeque<String>>,
}

#[async_trait]
impl JobBackend for OrphanBackend {
    fn mode(&self) -> QueueMode {
        QueueMode::Memory
    }

    fn is_live(&self) -> bool {
        true
    }

    async fn push(&self, job: &Job) -> Result<(), QueueError> {
        self.pending.lock().await.push_back(job.job_id.clone());
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>, QueueError> {
        Ok(self.pending.lock().await.pop_front())
    }

    async fn load(&self, _job_id: &str) -> Result<Option<Job>, QueueError> {
        Ok(None)
    }

    async fn save(&self, _job: &Job) -> Result<(), QueueError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_enqueue_then_status_is_queued() {
    let store = QueueStore::in_memory();

    let job = store.enqueue("j1", "echo hello").await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let stored = store.get_status("j1").await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert!(stored.logs.is_empty());
    assert_eq!(stored.command, "echo hello");
    assert_eq!(stored.created_at, job.created_at);
}

#[tokio::test]
async fn test_unknown_job_is_none() {
    let store = QueueStore::in_memory();
    assert!(store.get_status("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unconnected_store_is_unavailable() {
    let store = QueueStore::new(QueueConfig::default());

    assert!(!store.is_healthy());
    assert_eq!(store.mode(), QueueMode::Durable);
    assert!(matches!(
        store.enqueue("j1", "true").await,
        Err(QueueError::Unavailable(_))
    ));
    assert!(matches!(store.dequeue().await, Err(QueueError::Unavailable(_))));
    assert!(matches!(
        store.get_status("j1").await,
        Err(QueueError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_dropped_durable_backend_is_unavailable() {
    let store = QueueStore::with_backend(QueueConfig::default(), Arc::new(DeadBackend));

    assert_eq!(store.mode(), QueueMode::Durable);
    assert!(!store.is_healthy());
    assert!(matches!(
        store.update_status("j1", JobStatus::Running, vec![]).await,
        Err(QueueError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_dequeue_is_fifo_and_never_repeats() {
    let store = QueueStore::in_memory();
    store.enqueue("first", "true").await.unwrap();
    store.enqueue("second", "true").await.unwrap();

    assert_eq!(store.dequeue().await.unwrap().unwrap().job_id, "first");
    assert_eq!(store.dequeue().await.unwrap().unwrap().job_id, "second");
    assert!(store.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_dequeue_does_not_change_status() {
    let store = QueueStore::in_memory();
    store.enqueue("j1", "true").await.unwrap();
    store.dequeue().await.unwrap();

    let job = store.get_status("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
}

#[tokio::test]
async fn test_dequeue_skips_missing_record() {
    let backend = Arc::new(OrphanBackend {
        pending: Mutex::new(VecDeque::new()),
    });
    let store = QueueStore::with_backend(QueueConfig::default(), backend);
    store.enqueue("ghost", "true").await.unwrap();

    assert!(store.dequeue().await.unwrap().is_none());
    assert!(store.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_status_lifecycle() {
    let store = QueueStore::in_memory();
    store.enqueue("j1", "echo a").await.unwrap();

    store
        .update_status("j1", JobStatus::Running, vec![])
        .await
        .unwrap();
    let running = store.get_status("j1").await.unwrap().unwrap();
    assert_eq!(running.status, JobStatus::Running);
    assert!(running.started_at.is_some());
    assert!(running.completed_at.is_none());

    let logs = vec![
        "[stdout] a".to_string(),
        "[system] Process exited with code: 0".to_string(),
    ];
    store
        .update_status("j1", JobStatus::Completed, logs.clone())
        .await
        .unwrap();
    let done = store.get_status("j1").await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.logs, logs);
    assert_eq!(done.started_at, running.started_at);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn test_update_unknown_job_is_noop() {
    let store = QueueStore::in_memory();
    store
        .update_status("nobody", JobStatus::Running, vec![])
        .await
        .unwrap();
    assert!(store.get_status("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_terminal_status_is_final() {
    let store = QueueStore::in_memory();
    store.enqueue("j1", "exit 1").await.unwrap();
    store
        .update_status("j1", JobStatus::Running, vec![])
        .await
        .unwrap();
    store
        .update_status("j1", JobStatus::Failed, vec!["x".to_string()])
        .await
        .unwrap();
    let failed = store.get_status("j1").await.unwrap().unwrap();

    store
        .update_status("j1", JobStatus::Running, vec![])
        .await
        .unwrap();
    store
        .update_status("j1", JobStatus::Completed, vec![])
        .await
        .unwrap();

    assert_eq!(store.get_status("j1").await.unwrap().unwrap(), failed);
}

#[tokio::test]
async fn test_reenqueue_resets_history() {
    let store = QueueStore::in_memory();
    store.enqueue("j1", "exit 1").await.unwrap();
    store.dequeue().await.unwrap();
    store
        .update_status("j1", JobStatus::Running, vec![])
        .await
        .unwrap();
    store
        .update_status("j1", JobStatus::Failed, vec!["boom".to_string()])
        .await
        .unwrap();

    store.enqueue("j1", "exit 0").await.unwrap();

    let job = store.get_status("j1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.command, "exit 0");
    assert!(job.logs.is_empty());
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());
    assert_eq!(store.dequeue().await.unwrap().unwrap().job_id, "j1");
}

#[tokio::test]
async fn test_connect_falls_back_to_memory() {
    let store = QueueStore::new(refused_config(1));
    assert!(!store.is_healthy());

    store.connect().await;

    assert_eq!(store.mode(), QueueMode::Memory);
    assert!(store.is_healthy());
    store.enqueue("j1", "true").await.unwrap();
    assert_eq!(store.dequeue().await.unwrap().unwrap().job_id, "j1");
}

#[tokio::test]
async fn test_connect_backs_off_between_attempts() {
    let store = QueueStore::new(refused_config(50));

    let started = Instant::now();
    store.connect().await;

    // 50 + 100 + 200 + 400 between five attempts.
    assert!(started.elapsed() >= Duration::from_millis(750));
    assert_eq!(store.mode(), QueueMode::Memory);
}

#[tokio::test]
async fn test_connect_without_attempts_goes_straight_to_memory() {
    let mut config = refused_config(1);
    config.reconnect.max_attempts = 0;
    let store = QueueStore::new(config);

    store.connect().await;
    assert_eq!(store.mode(), QueueMode::Memory);
    assert!(store.is_healthy());
}

#[tokio::test]
async fn test_memory_mode_is_permanent() {
    let store = QueueStore::new(refused_config(1));
    store.connect().await;
    store.connect().await;
    assert_eq!(store.mode(), QueueMode::Memory);
}

#[tokio::test]
async fn test_close_clears_memory_state() {
    let store = QueueStore::in_memory();
    store.enqueue("j1", "true").await.unwrap();

    store.close().await;
    assert_eq!(store.mode(), QueueMode::Memory);
    assert!(!store.is_healthy());
    assert!(store.get_status("j1").await.is_err());

    store.connect().await;
    assert!(store.is_healthy());
    assert_eq!(store.mode(), QueueMode::Memory);
    assert!(store.get_status("j1").await.unwrap().is_none());
    assert!(store.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_supervisor_fails_over_dropped_connection() {
    let store = Arc::new(QueueStore::with_backend(
        refused_config(1),
        Arc::new(DeadBackend),
    ));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(
        store
            .clone()
            .supervise(Duration::from_millis(10), shutdown.clone()),
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.mode() != QueueMode::Memory && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(store.mode(), QueueMode::Memory);
    assert!(store.is_healthy());

    shutdown.cancel();
    handle.await.unwrap();
}
