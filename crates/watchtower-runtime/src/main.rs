//! # Babylon Watchtower Daemon
//!
//! Loads configuration from the environment, builds one orchestrator per
//! configured network, and supervises them until ctrl-c. Exit code 0 on a
//! normal shutdown, 1 on an initialization failure.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use watchtower_runtime::{AppConfig, Orchestrator, Stores};
use watchtower_types::LogSink;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!(error = %e, "initialization failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    info!("Babylon Watchtower starting");

    let config = AppConfig::from_env()?;
    if !config.monitoring_enabled {
        info!("monitoring disabled, exiting");
        return Ok(());
    }
    if config.store_uri.is_some() {
        info!("store URI configured; records are mirrored to the in-memory store in this build");
    }

    let stores = Stores::in_memory();
    let sink = Arc::new(LogSink);

    let mut orchestrators = Vec::new();
    for net in &config.networks {
        info!(network = %net.network, endpoints = net.rpc_urls.len(), "configuring network");
        let orchestrator =
            Arc::new(Orchestrator::build(&config, net, stores.clone(), sink.clone())?);
        orchestrators.push(orchestrator);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut handles = Vec::new();
    for orchestrator in orchestrators {
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(
            async move { orchestrator.run(shutdown).await },
        ));
    }
    for handle in handles {
        // A run error only surfaces from bootstrap; it makes the whole
        // process fail with exit code 1.
        handle.await??;
    }

    info!("Babylon Watchtower stopped");
    Ok(())
}
