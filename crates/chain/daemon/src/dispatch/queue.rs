//! Bounded work queue and in-flight tracking

use crate::error::DispatchError;
use chain_types::ChainExecutionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// What a worker should do with an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    /// Run or resume to a terminal state
    Run,
    /// Fail it as interrupted, compensating what already succeeded
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub execution_id: ChainExecutionId,
    pub mode: WorkMode,
}

impl WorkItem {
    pub fn run(execution_id: ChainExecutionId) -> Self {
        Self {
            execution_id,
            mode: WorkMode::Run,
        }
    }

    pub fn abandon(execution_id: ChainExecutionId) -> Self {
        Self {
            execution_id,
            mode: WorkMode::Abandon,
        }
    }
}

#[derive(Debug)]
struct Slot {
    cancel: CancellationToken,
    claimed: bool,
}

/// Executions currently owned by a worker, with their cancellation tokens
///
/// Cancelling an execution nobody owns leaves a tripped token behind; the
/// worker that later claims it starts out cancelled. A cancel that lands
/// after the owning worker released a finished execution leaves such a slot
/// with nobody left to claim it; the recovery sweep discards those.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    slots: DashMap<ChainExecutionId, Slot>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an execution; `None` if another worker holds it
    pub fn claim(&self, id: ChainExecutionId) -> Option<CancellationToken> {
        match self.slots.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().claimed {
                    return None;
                }
                entry.get_mut().claimed = true;
                Some(entry.get().cancel.clone())
            }
            Entry::Vacant(entry) => {
                let cancel = CancellationToken::new();
                entry.insert(Slot {
                    cancel: cancel.clone(),
                    claimed: true,
                });
                Some(cancel)
            }
        }
    }

    pub fn release(&self, id: &ChainExecutionId) {
        self.slots.remove(id);
    }

    /// Request cancellation; returns whether a worker currently owns the execution
    pub fn cancel(&self, id: ChainExecutionId) -> bool {
        match self.slots.entry(id) {
            Entry::Occupied(entry) => {
                entry.get().cancel.cancel();
                entry.get().claimed
            }
            Entry::Vacant(entry) => {
                let cancel = CancellationToken::new();
                cancel.cancel();
                entry.insert(Slot {
                    cancel,
                    claimed: false,
                });
                false
            }
        }
    }

    /// Executions holding a tripped token that no worker has claimed yet
    pub fn unclaimed(&self) -> Vec<ChainExecutionId> {
        self.slots
            .iter()
            .filter(|slot| !slot.claimed)
            .map(|slot| *slot.key())
            .collect()
    }

    /// Drop a slot unless a worker has claimed it in the meantime
    pub fn discard_unclaimed(&self, id: &ChainExecutionId) -> bool {
        self.slots.remove_if(id, |_, slot| !slot.claimed).is_some()
    }

    pub fn is_in_flight(&self, id: &ChainExecutionId) -> bool {
        self.slots.get(id).map_or(false, |slot| slot.claimed)
    }

    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.claimed).count()
    }
}

/// Producer side of the work queue
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<WorkItem>,
    tracker: Arc<ExecutionTracker>,
}

/// Consumer side of the work queue, shared by every worker
#[derive(Debug, Clone)]
pub struct WorkQueue {
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
}

/// Create a bounded queue holding at most `capacity` items
pub fn work_queue(capacity: usize) -> (Dispatcher, WorkQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Dispatcher {
            tx,
            tracker: Arc::new(ExecutionTracker::new()),
        },
        WorkQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl Dispatcher {
    /// Enqueue without waiting
    pub fn dispatch(&self, item: WorkItem) -> Result<(), DispatchError> {
        self.tx.try_send(item).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;
        tracing::debug!(
            execution_id = %item.execution_id,
            mode = ?item.mode,
            "Execution dispatched"
        );
        Ok(())
    }

    /// Trip the execution's cancellation token
    pub fn cancel(&self, id: ChainExecutionId) -> bool {
        self.tracker.cancel(id)
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }
}

impl WorkQueue {
    pub async fn recv(&self) -> Option<WorkItem> {
        self.rx.lock().await.recv().await
    }
}
