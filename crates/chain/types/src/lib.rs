//! Event chain domain types
//!
//! An event chain is an operator-authored, multi-step reaction to a domain
//! event: "when X happens, run action A, then (if a condition holds) B,
//! then C". This crate holds the pure domain model:
//!
//! - [`Registry`]: the startup catalog of valid triggers and versioned actions
//! - [`ChainDefinition`]: the authored blueprint, validated against the registry
//! - [`ChainExecution`]: one run of a definition with its step records
//! - [`ChainEvent`]: domain events returned by aggregate operations
//!
//! Running executions lives in `chain-engine`; persistence and dispatch live
//! in `chain-daemon`.

#![deny(unsafe_code)]

pub mod definition;
pub mod errors;
pub mod events;
pub mod execution;
pub mod ids;
pub mod registry;

pub use definition::{
    ChainDefinition, ChainDefinitionStep, NewChainDefinition, StepExpressions, TRIGGER_ROOT,
};
pub use errors::{ChainError, ChainResult, RegistryError, RegistryResult};
pub use events::ChainEvent;
pub use execution::{
    ChainExecution, CompensationStatus, ExecutionFailure, ExecutionStatus, FailureCause,
    StepExecution, StepStatus,
};
pub use ids::{
    ChainDefinitionId, ChainExecutionId, FamilyId, StepExecutionId, TriggerEventId, UserId,
};
pub use registry::{ActionDescriptor, ModuleCatalog, Registry, RegistryBuilder, TriggerDescriptor};
