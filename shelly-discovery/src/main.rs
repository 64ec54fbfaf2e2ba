mod cli;
mod config;
mod device;
mod discovery;
mod mdns;
mod report;
mod runner;
#[cfg(test)]
mod testing;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::cli::Args;
use crate::config::Config;
use crate::device::DeviceClient;
use crate::runner::Schedule;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the report only
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shelly_discovery=info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(&args).context("Invalid configuration")?;
    let devices = DeviceClient::new(&config.device)?;

    let daemon = ServiceDaemon::new()
        .context("Failed to initialize mDNS resolver")?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    let schedule = Schedule::from_config(&config.schedule);
    let (cycle_config, cycle_daemon, cycle_devices, cycle_cancel) = (&config, &daemon, &devices, &cancel);
    let result = runner::run(schedule, cancel.clone(), move || async move {
        let mut stdout = std::io::stdout();
        discovery::discover_once(cycle_config, cycle_daemon, cycle_devices, cycle_cancel, &mut stdout).await
    })
    .await;

    if let Err(e) = daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    let cycles = result?;
    tracing::debug!("Completed {} discovery cycle(s)", cycles);
    Ok(())
}
