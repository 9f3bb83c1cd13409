//! Main entry point for the Leasehold lock service.
//!
//! Loads configuration, starts logging and metrics, restores the lease store
//! snapshot, and sweeps expired leases until Ctrl+C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use leasehold_server::{
    Cli, Configuration, LockServer, metrics,
    startup::{self, wait_for_shutdown_signal},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::new(&cli).context("failed to load configuration")?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    configuration
        .validate()
        .context("configuration rejected")?;

    metrics::init_metrics();
    if configuration.metrics_enabled() {
        let address = configuration.metrics_listen_address()?;
        metrics::install_prometheus_exporter(address)
            .context("failed to install Prometheus exporter")?;
        info!(%address, "Prometheus metrics exporter listening");
    }

    let server = LockServer::from_configuration(&configuration)?;
    let shutdown = wait_for_shutdown_signal();
    server.run(shutdown).await?;

    info!("Shutdown complete");
    Ok(())
}
