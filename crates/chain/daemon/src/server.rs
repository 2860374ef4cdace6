//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{ChainDaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::http_executor::HttpActionExecutor;
use crate::outbox::BroadcastOutbox;
use crate::runtime::{ChainRuntime, RuntimeParts};
use crate::storage::{InMemoryStorage, PostgresStorage, Storage};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Chain daemon server
pub struct Server {
    config: ChainDaemonConfig,
    runtime: ChainRuntime,
}

impl Server {
    /// Build the registry, connect storage and start the execution runtime
    pub async fn new(config: ChainDaemonConfig) -> DaemonResult<Self> {
        let registry = Arc::new(config.catalog.build_registry()?);
        tracing::info!(
            triggers = registry.triggers().len(),
            actions = registry.actions().len(),
            "Registry built"
        );

        let storage: Arc<dyn Storage> = match &config.storage {
            StorageConfig::Memory => {
                tracing::warn!("Using in-memory storage; executions do not survive restarts");
                Arc::new(InMemoryStorage::new())
            }
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => Arc::new(PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?),
        };

        let executor = HttpActionExecutor::from_registry(
            reqwest::Client::new(),
            &registry,
            &config.catalog.endpoints(),
        );
        if executor.route_count() < registry.actions().len() {
            tracing::warn!(
                routed = executor.route_count(),
                registered = registry.actions().len(),
                "Some actions have no module endpoint and will fail when invoked"
            );
        }

        let runtime = ChainRuntime::start(
            RuntimeParts {
                registry,
                storage,
                executor: Arc::new(executor),
                outbox: Arc::new(BroadcastOutbox::default()),
            },
            &config,
        )
        .await?;

        Ok(Self { config, runtime })
    }

    /// Serve the API until a shutdown signal, then drain the runtime
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.runtime.service().clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Chain daemon listening on {}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("Chain daemon shutting down");
        self.runtime.shutdown().await;

        served
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
