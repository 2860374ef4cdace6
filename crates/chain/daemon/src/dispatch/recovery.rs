//! Recovery sweeps over unfinished executions
//!
//! At startup every `Pending`, `Running` or `Compensating` execution is
//! handed back to the queue. A periodic sweep repeats this for executions
//! nobody owns that have been idle for at least one interval: pending ones
//! that did not fit in the queue, and running ones a worker gave up on after
//! a storage failure. Each sweep also discards pre-cancelled tracker slots
//! whose execution already finished. One daemon per database is assumed.

use super::queue::{Dispatcher, WorkItem, WorkMode};
use crate::error::DispatchError;
use crate::storage::{Storage, StorageResult};
use chain_types::{ChainExecution, ExecutionStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What recovery does with executions that had started running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Resume at the first unsettled step (the in-flight action is re-invoked)
    #[default]
    Resume,
    /// Fail them as interrupted and compensate
    Fail,
}

impl RecoveryMode {
    pub fn work_item(&self, execution: &ChainExecution) -> WorkItem {
        match (*self, execution.status) {
            (RecoveryMode::Fail, ExecutionStatus::Running | ExecutionStatus::Compensating) => {
                WorkItem::abandon(execution.id)
            }
            _ => WorkItem::run(execution.id),
        }
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed: usize,
    pub abandoned: usize,
    /// Left in storage because the queue was full
    pub deferred: usize,
    /// Stale cancellation slots of finished executions
    pub pruned: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.resumed + self.abandoned + self.deferred
    }
}

/// Re-enqueue unfinished executions that no worker owns
///
/// With `min_idle`, executions updated more recently than that are skipped.
pub async fn sweep(
    storage: &dyn Storage,
    dispatcher: &Dispatcher,
    mode: RecoveryMode,
    min_idle: Option<Duration>,
) -> StorageResult<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let cutoff = min_idle
        .and_then(|idle| chrono::Duration::from_std(idle).ok())
        .map(|idle| Utc::now() - idle);

    // Taken before listing: a slot only exists once its execution is stored.
    let unclaimed = dispatcher.tracker().unclaimed();
    let unfinished = storage.list_unfinished_executions().await?;
    let live: HashSet<_> = unfinished.iter().map(|execution| execution.id).collect();

    for id in unclaimed.into_iter().filter(|id| !live.contains(id)) {
        if dispatcher.tracker().discard_unclaimed(&id) {
            tracing::debug!(execution_id = %id, "Discarded stale cancellation");
            report.pruned += 1;
        }
    }

    for execution in unfinished {
        if dispatcher.tracker().is_in_flight(&execution.id) {
            continue;
        }
        if cutoff.map_or(false, |cutoff| execution.updated_at > cutoff) {
            continue;
        }

        let item = mode.work_item(&execution);
        match dispatcher.dispatch(item) {
            Ok(()) => {
                tracing::info!(
                    execution_id = %execution.id,
                    status = %execution.status,
                    mode = ?item.mode,
                    "Recovered execution"
                );
                match item.mode {
                    WorkMode::Run => report.resumed += 1,
                    WorkMode::Abandon => report.abandoned += 1,
                }
            }
            Err(DispatchError::QueueFull) => {
                tracing::warn!(
                    execution_id = %execution.id,
                    "Work queue full, execution deferred to the next sweep"
                );
                report.deferred += 1;
            }
            Err(DispatchError::Closed) => break,
        }
    }

    Ok(report)
}

/// Run `sweep` every `interval` until `shutdown` fires
pub fn spawn_sweeper(
    storage: Arc<dyn Storage>,
    dispatcher: Dispatcher,
    mode: RecoveryMode,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; startup recovery already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match sweep(storage.as_ref(), &dispatcher, mode, Some(interval)).await {
                        Ok(report) if report.total() > 0 || report.pruned > 0 => {
                            tracing::info!(
                                resumed = report.resumed,
                                abandoned = report.abandoned,
                                deferred = report.deferred,
                                pruned = report.pruned,
                                "Sweep re-enqueued stranded executions"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Recovery sweep failed"),
                    }
                }
            }
        }
    })
}
