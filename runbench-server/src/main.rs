use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use runbench_core::{RunCoordinator, RunStore};
use runbench_server::config::ServerConfig;
use runbench_server::infra::AppState;
use runbench_server::routes::build_router;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "runbench-server", about = "Benchmark run orchestration service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "RUNBENCH_CONFIG", default_value = "runbench.toml")]
    config: PathBuf,

    /// Override the configured bind address.
    #[arg(long, env = "RUNBENCH_BIND")]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;
    let bind_addr = args.bind.unwrap_or(config.bind_addr);

    let store = RunStore::open(&config.data_dir)
        .await
        .with_context(|| format!("opening run store at {}", config.data_dir.display()))?;
    let catalog = Arc::new(config.catalog());
    let coordinator = RunCoordinator::new(store, catalog, config.coordinator_config());

    let router = build_router(AppState::new(coordinator.clone()));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(addr = %bind_addr, "runbench server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router's clone is gone once serve returns; closing ours lets the
    // worker finish the in-flight run before the runtime is torn down.
    coordinator.shutdown().await;

    info!("runbench server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler");
        return;
    }
    info!("shutdown signal received");
}
