//! Error types for the chain domain

use crate::{ExecutionStatus, StepStatus};
use chain_expr::ExprError;

/// Errors raised by chain aggregates: authoring validation and state guards
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    #[error("Unknown trigger event type: {0}")]
    UnknownTrigger(String),

    #[error("Unknown action: {action_type}@v{version}")]
    UnknownAction { action_type: String, version: u32 },

    #[error("Duplicate step alias: {0}")]
    DuplicateAlias(String),

    #[error("Invalid step alias '{0}': expected an identifier other than 'trigger'")]
    InvalidAlias(String),

    #[error("Chain definition name must not be empty")]
    EmptyName,

    #[error("Invalid expression in step '{alias}' ({field}): {source}")]
    InvalidExpression {
        alias: String,
        field: String,
        source: ExprError,
    },

    #[error("Step '{0}' is compensatable but no compensation action is declared")]
    MissingCompensationAction(String),

    #[error("Step '{alias}' cannot move from {from} to {to}")]
    InvalidStepTransition {
        alias: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Execution cannot move from {from} to {to}")]
    InvalidExecutionTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("Step '{alias}' has order {step_order}, below the last appended order {last_order}")]
    StepOrderViolation {
        alias: String,
        step_order: i32,
        last_order: i32,
    },

    #[error("Step execution not found: {0}")]
    StepNotFound(String),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}

/// Errors raised while building the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Trigger '{event_type}' declared by '{module}' is already registered by '{existing}'")]
    DuplicateTrigger {
        event_type: String,
        module: String,
        existing: String,
    },

    #[error("Action '{action_type}@v{version}' declared by '{module}' is already registered by '{existing}'")]
    DuplicateAction {
        action_type: String,
        version: u32,
        module: String,
        existing: String,
    },
}

/// Result type alias for chain aggregate operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Result type alias for registry construction
pub type RegistryResult<T> = Result<T, RegistryError>;
