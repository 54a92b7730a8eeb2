//! agent-service: runs queued shell commands and reports results to the Hub.

mod cli;
mod server;

use clap::Parser;
use tracing::{error, info, warn};

use agent_service_config::{ConfigLoader, ConfigValidator};

use crate::cli::Cli;
use crate::server::{init_tracing, run_service};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);

    init_tracing(&config.logging)?;

    let warnings = match ConfigValidator::validate(&config).into_result() {
        Ok(warnings) => warnings,
        Err(e) => {
            error!("Failed to start Agent Service: {}", e);
            return Err(e.into());
        }
    };
    for warning in warnings
        .iter()
        .chain(ConfigValidator::normalize(&mut config).iter())
    {
        warn!("{}", warning);
    }
    info!("Configuration validated successfully");

    run_service(config).await
}
