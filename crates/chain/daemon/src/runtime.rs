//! Execution runtime: queue, worker pool, recovery and sweeper wired together

use crate::config::ChainDaemonConfig;
use crate::dispatch::{
    spawn_sweeper, sweep, work_queue, Dispatcher, RecoveryReport, WorkerContext, WorkerPool,
};
use crate::outbox::EventOutbox;
use crate::service::ChainService;
use crate::storage::{Storage, StorageResult};
use chain_engine::{ActionExecutor, ChainOrchestrator};
use chain_types::Registry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared collaborators of the runtime
pub struct RuntimeParts {
    pub registry: Arc<Registry>,
    pub storage: Arc<dyn Storage>,
    pub executor: Arc<dyn ActionExecutor>,
    pub outbox: Arc<dyn EventOutbox>,
}

pub struct ChainRuntime {
    service: ChainService,
    dispatcher: Dispatcher,
    workers: WorkerPool,
    sweeper: JoinHandle<()>,
    shutdown: CancellationToken,
    recovery: RecoveryReport,
}

impl ChainRuntime {
    /// Start workers, run the startup recovery sweep, then start the periodic sweeper
    pub async fn start(parts: RuntimeParts, config: &ChainDaemonConfig) -> StorageResult<Self> {
        let shutdown = CancellationToken::new();
        let (dispatcher, queue) = work_queue(config.dispatch.queue_capacity);

        let context = Arc::new(WorkerContext {
            storage: parts.storage.clone(),
            orchestrator: ChainOrchestrator::new(
                parts.executor,
                config.orchestrator.to_engine_config(),
            ),
            tracker: dispatcher.tracker().clone(),
            outbox: parts.outbox.clone(),
        });
        let workers = WorkerPool::start(
            config.dispatch.workers,
            queue,
            context,
            shutdown.clone(),
        );

        let recovery = sweep(
            parts.storage.as_ref(),
            &dispatcher,
            config.dispatch.recovery,
            None,
        )
        .await?;
        tracing::info!(
            workers = workers.size(),
            resumed = recovery.resumed,
            abandoned = recovery.abandoned,
            deferred = recovery.deferred,
            "Startup recovery complete"
        );

        let sweeper = spawn_sweeper(
            parts.storage.clone(),
            dispatcher.clone(),
            config.dispatch.recovery,
            config.dispatch.sweep_interval(),
            shutdown.clone(),
        );

        let service = ChainService::new(
            parts.registry,
            parts.storage,
            dispatcher.clone(),
            parts.outbox,
        );

        Ok(Self {
            service,
            dispatcher,
            workers,
            sweeper,
            shutdown,
            recovery,
        })
    }

    pub fn service(&self) -> &ChainService {
        &self.service
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// What the startup sweep found
    pub fn recovery(&self) -> RecoveryReport {
        self.recovery
    }

    /// Stop taking work and wait for in-flight executions to settle
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.sweeper.await {
            tracing::error!(error = %err, "Sweeper task panicked");
        }
        self.workers.join().await;
        tracing::info!("Chain runtime stopped");
    }
}
