//! Error types for the orchestrator

use chain_expr::ExprError;
use chain_types::ChainError;
use std::time::Duration;

/// Failure reported by (or on behalf of) the action-execution boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("No handler for action {action_type}@v{version}")]
    Unhandled { action_type: String, version: u32 },

    #[error("{0}")]
    Failed(String),

    #[error("Action timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Action cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A step's inputs or condition could not be evaluated
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("Input '{param}' could not be resolved from '{expression}': {source}")]
    Unresolved {
        param: String,
        expression: String,
        source: ExprError,
    },

    #[error(transparent)]
    Invalid(#[from] ChainError),
}

/// The persistence hook refused a state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CheckpointError(pub String);

impl CheckpointError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that abort an orchestrator run
///
/// Step failures are never returned here; they are recorded in the execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Transition(#[from] ChainError),
}

/// Result type alias for orchestrator runs
pub type EngineResult<T> = Result<T, EngineError>;
