//! Process entry point: loads configuration, builds the application state
//! (§9), and serves the HTTP API until interrupted.

use clap::Parser;
use planning_core::{AppConfig, PlanningError, Result};
use planning_server::server::ApiServer;
use planning_server::startup::build_state;
use tracing::info;

/// Planning Explorer API server.
#[derive(Parser)]
#[command(name = "planning-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP API for the Planning Explorer AI platform", long_about = None)]
struct Cli {
    /// Overrides `PLANNING_BIND_ADDRESS` / the `0.0.0.0:8000` default.
    #[arg(long)]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(bind_address) = cli.bind_address {
        config.bind_address = bind_address;
    }

    info!(bind_address = %config.bind_address, es_url = %config.es.url, "starting planning-server");

    let bind_addr = config.bind_address.parse().map_err(|err| PlanningError::validation(format!("invalid bind address '{}': {err}", config.bind_address)))?;

    let state = build_state(config).await?;
    let server = ApiServer::new(bind_addr, state);

    server.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
