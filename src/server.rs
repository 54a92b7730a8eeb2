//! Service bootstrap and shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use agent_service_api::{ApiServer, AppState};
use agent_service_config::{Config, ConfigLoader, LoggingConfig};
use agent_service_queue::{QueueMode, QueueStore};
use agent_service_worker::Worker;

/// Initialize tracing with console output and, when a log directory is
/// configured, daily-rotated files.
///
/// `RUST_LOG` wins over the configured level.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)?,
    };

    let file_layer = match &logging.directory {
        Some(dir) => {
            let log_dir = PathBuf::from(ConfigLoader::expand_path(&dir.to_string_lossy()));
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("agent-service")
                .filename_suffix("log")
                .max_log_files(14)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The writer flushes for as long as its guard lives.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    Ok(())
}

/// Run the service until SIGINT or SIGTERM.
pub(crate) async fn run_service(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Agent Service v{}", env!("CARGO_PKG_VERSION"));
    info!("- Port: {}", config.server.port);
    info!("- Job Timeout: {}ms", config.worker.job_timeout_ms);
    info!("- Poll Interval: {}ms", config.worker.poll_interval_ms);
    info!("Redis URL: {}", config.queue.redis_url);
    info!("Hub URL: {}", config.worker.hub_url);

    let store = Arc::new(QueueStore::new(config.queue.clone()));
    store.connect().await;
    if store.mode() == QueueMode::Memory {
        warn!("Redis unavailable; jobs are kept in memory and lost on restart");
    }

    let shutdown = CancellationToken::new();
    let supervisor = tokio::spawn(
        store
            .clone()
            .supervise(config.worker.poll_interval(), shutdown.clone()),
    );

    let worker = Worker::from_config(store.clone(), &config.worker)?;
    worker.start();
    info!("Background worker started");

    let state = Arc::new(AppState::new(store.clone(), config.server.port));
    let server = ApiServer::new(config.server.clone(), state);
    let served = server.run_until(shutdown_signal()).await;
    if let Err(e) = &served {
        error!("HTTP server failed: {}", e);
    }

    info!("Shutting down gracefully...");
    shutdown.cancel();
    worker.stop().await;
    if let Err(e) = supervisor.await {
        warn!("Queue supervisor ended abnormally: {}", e);
    }
    store.close().await;

    served?;
    info!(
        "Agent Service shut down ({} completed, {} failed)",
        worker.jobs_completed(),
        worker.jobs_failed()
    );
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
