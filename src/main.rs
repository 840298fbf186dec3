use anyhow::{Context, Result};
use clap::Parser;
use solar_ev_charger::Config;
use solar_ev_charger::app::App;
use solar_ev_charger::logging::init_logging;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Throttle an EV charging station to the available solar surplus
#[derive(Debug, Parser)]
#[command(name = "sevc", version = env!("APP_VERSION"))]
struct Args {
    /// Configuration file; the default locations are searched when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    config.validate().context("validating configuration")?;
    init_logging(&config.logging).context("initializing logging")?;

    info!("sevc {} starting up", env!("APP_VERSION"));

    let mut app = App::start(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start: {}", e))?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("Failed to listen for interrupt: {}", e);
            }
            info!("Interrupt received, shutting down");
        }
        name = app.wait_for_exit() => {
            error!("Worker {} exited unexpectedly, shutting down", name);
        }
    }

    match app.shutdown().await {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Shutdown failed: {}", e);
            Err(anyhow::anyhow!("Shutdown error: {}", e))
        }
    }
}
