//! Chain daemon - event chain orchestration service
//!
//! The daemon provides:
//! - REST API for chain definition authoring and trigger ingestion
//! - A bounded work queue drained by a fixed worker pool
//! - Startup recovery and a periodic sweep for stranded executions

use chain_daemon::error::{DaemonError, DaemonResult};
use chain_daemon::{ChainDaemonConfig, Server};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chain daemon CLI
#[derive(Parser)]
#[command(name = "chaind")]
#[command(about = "Chain daemon - event chain orchestration service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CHAIN_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "CHAIN_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "CHAIN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CHAIN_LOG_JSON")]
    json: bool,

    /// Start from development defaults instead of the built-in defaults
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if cli.dev {
        ChainDaemonConfig::development()
    } else {
        ChainDaemonConfig::load(cli.config.as_deref())
            .map_err(|e| DaemonError::Config(e.to_string()))?
    };

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;
    config.validate()?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        workers = config.dispatch.workers,
        recovery = ?config.dispatch.recovery,
        "Starting chain daemon"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
