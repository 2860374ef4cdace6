//! Dispatch boundary between "execution requested" and "execution running"
//!
//! Requests persist a pending execution and enqueue its id; a fixed pool of
//! workers claims ids from the bounded queue and runs them. Nothing waits on
//! a full queue: the execution stays pending and the recovery sweep picks it
//! up later.

mod queue;
mod recovery;
mod worker;

pub use queue::{work_queue, Dispatcher, ExecutionTracker, WorkItem, WorkMode, WorkQueue};
pub use recovery::{spawn_sweeper, sweep, RecoveryMode, RecoveryReport};
pub use worker::{StorageCheckpoint, WorkerContext, WorkerPool};
