//! CLI definitions for agent-service.

use std::path::PathBuf;

use clap::Parser;

use agent_service_config::Config;

/// agent-service CLI.
///
/// Every flag can also come from the environment and wins over the
/// configuration file.
#[derive(Debug, Default, Parser)]
#[command(name = "agent-service")]
#[command(about = "Runs queued shell commands and reports results to the Hub")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "AGENT_SERVICE_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Hub status callback URL
    #[arg(long, env = "HUB_URL")]
    pub hub_url: Option<String>,

    /// Per-job timeout in milliseconds
    #[arg(long, env = "JOB_TIMEOUT", value_name = "MS")]
    pub job_timeout: Option<u64>,

    /// Worker poll interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL", value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Log filter, e.g. `info` or `agent_service_queue=debug`
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Layer the command-line and environment overrides onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.redis_url {
            config.queue.redis_url = url.clone();
        }
        if let Some(url) = &self.hub_url {
            config.worker.hub_url = url.clone();
        }
        if let Some(ms) = self.job_timeout {
            config.worker.job_timeout_ms = ms;
        }
        if let Some(ms) = self.poll_interval {
            config.worker.poll_interval_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}
