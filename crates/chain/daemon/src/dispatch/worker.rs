//! Worker pool: long-lived tasks that claim and run executions

use super::queue::{ExecutionTracker, WorkItem, WorkMode, WorkQueue};
use crate::error::WorkerError;
use crate::outbox::EventOutbox;
use crate::storage::Storage;
use async_trait::async_trait;
use chain_engine::{ChainOrchestrator, CheckpointError, ExecutionCheckpoint, INTERRUPTED_REASON};
use chain_types::{ChainEvent, ChainExecution, FailureCause};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Persists every orchestrator state change through storage
pub struct StorageCheckpoint {
    storage: Arc<dyn Storage>,
}

impl StorageCheckpoint {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ExecutionCheckpoint for StorageCheckpoint {
    async fn save(&self, execution: &mut ChainExecution) -> Result<(), CheckpointError> {
        self.storage
            .save_execution(execution)
            .await
            .map_err(|e| CheckpointError::new(e.to_string()))
    }
}

/// Everything a worker needs to process a work item
pub struct WorkerContext {
    pub storage: Arc<dyn Storage>,
    pub orchestrator: ChainOrchestrator,
    pub tracker: Arc<ExecutionTracker>,
    pub outbox: Arc<dyn EventOutbox>,
}

impl WorkerContext {
    /// Claim, run and release one execution
    pub async fn process(&self, item: WorkItem) {
        let id = item.execution_id;
        let Some(cancel) = self.tracker.claim(id) else {
            tracing::debug!(execution_id = %id, "Execution already in flight, dropping duplicate");
            return;
        };

        match self.execute(item, &cancel).await {
            Ok(Some(event)) => self.outbox.publish(event),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    execution_id = %id,
                    error = %err,
                    "Execution left unfinished for recovery"
                );
            }
        }

        self.tracker.release(&id);
    }

    async fn execute(
        &self,
        item: WorkItem,
        cancel: &CancellationToken,
    ) -> Result<Option<ChainEvent>, WorkerError> {
        let Some(mut execution) = self.storage.get_execution(&item.execution_id).await? else {
            tracing::warn!(execution_id = %item.execution_id, "Dispatched execution not found");
            return Ok(None);
        };
        if execution.is_terminal() {
            return Ok(None);
        }

        let checkpoint = StorageCheckpoint::new(self.storage.clone());
        let definition = self
            .storage
            .get_definition(&execution.chain_definition_id)
            .await?;

        tracing::info!(
            execution_id = %execution.id,
            definition_id = %execution.chain_definition_id,
            status = %execution.status,
            mode = ?item.mode,
            "Worker claimed execution"
        );

        let event = match (item.mode, definition) {
            (_, None) => {
                self.orchestrator
                    .abandon(
                        &mut execution,
                        FailureCause::DefinitionMissing,
                        "chain definition no longer exists",
                        &checkpoint,
                    )
                    .await?
            }
            (WorkMode::Abandon, Some(_)) => {
                self.orchestrator
                    .abandon(
                        &mut execution,
                        FailureCause::Interrupted,
                        INTERRUPTED_REASON,
                        &checkpoint,
                    )
                    .await?
            }
            (WorkMode::Run, Some(definition)) => {
                self.orchestrator
                    .run(&mut execution, &definition, &checkpoint, cancel)
                    .await?
            }
        };
        Ok(event)
    }
}

/// Fixed set of workers sharing one queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks; they stop taking work once `shutdown` fires
    pub fn start(
        workers: usize,
        queue: WorkQueue,
        context: Arc<WorkerContext>,
        shutdown: CancellationToken,
    ) -> Self {
        let handles = (0..workers.max(1))
            .map(|index| {
                let queue = queue.clone();
                let context = context.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker = index, "Worker started");
                    loop {
                        let item = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            item = queue.recv() => match item {
                                Some(item) => item,
                                None => break,
                            },
                        };
                        context.process(item).await;
                    }
                    tracing::debug!(worker = index, "Worker stopped");
                })
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to finish its current execution and exit
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Worker task panicked");
            }
        }
    }
}
