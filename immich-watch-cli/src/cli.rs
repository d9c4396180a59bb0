//! # immich-watch CLI Interface
//!
//! Command parsing and process supervision for the `immich-watch` binary. All pipeline logic
//! (detection, stability, upload, archival) lives in the `immich-watch` core crate; this module
//! wires the pieces together, waits for a shutdown signal and reports periodic statistics.
//!
//! ## Subcommands
//! - `run --config <file>`: watch, upload and archive until Ctrl-C or SIGTERM.
//! - `check --config <file>`: validate the configuration, print it with the API key masked and
//!   test connectivity to the server.
//!
//! [`run`] is the programmatic entrypoint used by `main` and integration tests.
use anyhow::Result;
use clap::{Parser, Subcommand};
use immich_watch::config::Config;
use immich_watch::load_config::load_config;
use immich_watch::notifications::{LogNotifier, NotificationThrottle};
use immich_watch::{FileProcessor, FileWatcher, ImmichClient, Uploader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Watch folders and upload new photos and videos to an Immich server.
#[derive(Parser)]
#[clap(
    name = "immich-watch",
    version,
    about = "Watch folders for new photos and videos, upload them to Immich and archive the originals"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the configured directories and upload new files until interrupted
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Validate the config file and test connectivity to the Immich server
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Async CLI entrypoint for `main()` and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { config } => run_watch(load_config(config)?).await,
        Commands::Check { config } => check(load_config(config)?).await,
    }
}

async fn check(config: Config) -> Result<()> {
    println!("{config}");
    let client = ImmichClient::new(Arc::new(config))?;
    let reachable = client.test_connection().await;
    client.close().await;
    if !reachable {
        error!(command = "check", "Immich server is not reachable");
        anyhow::bail!("Cannot connect to Immich server");
    }
    println!("Connection to Immich server OK");
    Ok(())
}

async fn run_watch(config: Config) -> Result<()> {
    let config = Arc::new(config);
    info!(command = "run", "Starting immich-watch");
    info!("{config}");

    let uploader: Arc<dyn Uploader> = Arc::new(ImmichClient::new(Arc::clone(&config))?);
    let notifications = Arc::new(NotificationThrottle::new(
        Arc::new(LogNotifier),
        &config.notifications,
    ));
    let processor = Arc::new(FileProcessor::new(
        Arc::clone(&config),
        uploader,
        notifications,
    )?);
    processor.start().await?;

    let mut watcher = FileWatcher::new(Arc::clone(&config), processor.ready_callback());
    if let Err(e) = watcher.start().await {
        error!(error = %e, "Failed to start file watcher");
        processor.stop().await;
        return Err(e.into());
    }
    info!("immich-watch started, press Ctrl-C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut stats_tick = tokio::time::interval(config.stats_interval());
    stats_tick.tick().await;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = stats_tick.tick() => info!("{}", processor.stats().summary()),
        }
    }

    info!("Shutting down immich-watch...");
    watcher.stop().await;
    processor.stop().await;
    info!("immich-watch stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
