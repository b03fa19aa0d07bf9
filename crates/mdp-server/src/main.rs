//! MDP Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;

use mdp_common::logging::{init_logging, LogConfig};
use mdp_etl::{EtlConfig, EtlRunner};
use mdp_server::{config::ServerConfig, create_router, AppState};

/// Start the ETL signal server
#[derive(Debug, Parser)]
#[command(name = "mdp-server", version, about = "Movie data pipeline signal server")]
struct Args {
    /// Listen on this port (overrides MDP_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("mdp-server".to_string())
        .filter_directives("mdp_server=debug,mdp_etl=debug,tower_http=debug".to_string())
        .build();
    let log_config = LogConfig::from_env().unwrap_or(log_config);
    init_logging(&log_config)?;

    info!("Starting MDP Server");

    let args = Args::parse();

    let mut config = ServerConfig::load()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    // A corrupted checkpoint or unreachable source is fatal here, before the
    // listener comes up.
    let etl_config = EtlConfig::load()?;
    let runner = EtlRunner::from_config(&etl_config).await?;
    info!(streams = ?runner.streams(), "Pipeline runner initialized");

    let state = AppState {
        runner: Arc::new(runner),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening for signals on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
}
