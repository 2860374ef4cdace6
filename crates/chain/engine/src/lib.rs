//! Event chain orchestrator
//!
//! Runs [`ChainExecution`](chain_types::ChainExecution)s: ordered,
//! strictly sequential step execution with conditional skips, cross-step
//! input binding, per-step timeouts, cancellation and saga-style
//! compensation on failure.
//!
//! The engine never talks to storage or to business modules directly. Side
//! effects go through an [`ActionExecutor`]; persistence goes through an
//! [`ExecutionCheckpoint`] invoked after every state change.
//!
//! ```rust,no_run
//! use chain_engine::{ActionRouter, ChainOrchestrator, NoopCheckpoint, OrchestratorConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(
//! #     mut execution: chain_types::ChainExecution,
//! #     definition: chain_types::ChainDefinition,
//! # ) -> Result<(), chain_engine::EngineError> {
//! let orchestrator = ChainOrchestrator::new(Arc::new(ActionRouter::new()), OrchestratorConfig::default());
//! let event = orchestrator
//!     .run(&mut execution, &definition, &NoopCheckpoint, &CancellationToken::new())
//!     .await?;
//! # let _ = event;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod compensation;
pub mod context;
pub mod error;
pub mod executor;
pub mod orchestrator;

pub use context::BindingContext;
pub use error::{ActionError, CheckpointError, EngineError, EngineResult, MappingError};
pub use executor::{handler_fn, ActionExecutor, ActionHandler, ActionRequest, ActionRouter, FnHandler};
pub use orchestrator::{
    ChainOrchestrator, ExecutionCheckpoint, NoopCheckpoint, OrchestratorConfig,
    INTERRUPTED_REASON,
};
