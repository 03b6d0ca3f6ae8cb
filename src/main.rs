mod catalog;
mod cli;
mod config;
mod downloader;
mod error;
mod parser;
mod session;
mod sync_loop;
#[cfg(test)]
mod test_support;
mod types;

use anyhow::Context;
use cli::Cli;
use clap::Parser;
use colored::*;
use config::Config;
use error::SyncError;
use log::{debug, error, info};
use session::SessionClient;
use std::sync::Arc;
use sync_loop::{SyncLoop, SyncOptions};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOGLEVEL", "info")).init();
    info!("Starting report synchronizer");

    let cli = Cli::parse();
    debug!("CLI arguments parsed: {:?}", cli);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("{}", "Failed to load configuration".red());
            return Err(e).with_context(|| format!("loading {}", cli.config.display()));
        }
    };
    info!(
        "Polling {} every {} minute(s) with {} worker(s) into {}",
        config.service_url,
        config.poll_interval_minutes,
        config.download_worker_count,
        config.download_dir.display()
    );

    let client = SessionClient::new(&config).context("building session client")?;
    let cancel = CancellationToken::new();
    tokio::spawn(watch_for_shutdown(cancel.clone()));

    let options = SyncOptions::from_config(&config, cli.once, !cli.quiet);
    let mut sync = SyncLoop::new(Arc::new(client), options, cancel);
    if let Err(e) = sync.run().await {
        error!("Report synchronization failed: {}", e);
        eprintln!("{}", "Report synchronization failed".red());
        let stage = if e.is_fatal() {
            "authenticating with the report service"
        } else {
            "synchronizing reports"
        };
        return Err(e).context(stage);
    }
    debug!("Sync loop finished in state {:?}", sync.state());

    println!(
        "\n{} after {} cycle(s), {} report(s) still pending",
        "Report synchronizer stopped".green(),
        sync.cycles(),
        sync.catalog().pending_count()
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config, SyncError> {
    let mut config = Config::load(&cli.config)?;
    if let Some(dir) = &cli.output_dir {
        config.download_dir = dir.clone();
    }
    if let Some(parallelism) = cli.parallelism {
        config.download_worker_count = parallelism;
    }
    config.validate()?;
    Ok(config)
}

async fn watch_for_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = term.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                error!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
    cancel.cancel();
}
