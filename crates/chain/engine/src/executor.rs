//! The action-execution boundary
//!
//! This is the single seam through which a chain causes side effects. Business
//! modules own the actions; the orchestrator only knows `(action_type,
//! version, inputs)`. A crash mid-run can cause a step to be invoked again
//! during recovery, so implementations should use `idempotency_key` where the
//! downstream module supports it.

use crate::error::ActionError;
use async_trait::async_trait;
use chain_types::ChainExecutionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One action invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub execution_id: ChainExecutionId,
    /// Alias of the step the invocation belongs to
    pub alias: String,
    pub action_type: String,
    pub version: u32,
    pub inputs: Map<String, Value>,
    /// True when undoing a previously succeeded step
    #[serde(default)]
    pub is_compensation: bool,
}

impl ActionRequest {
    /// Stable key for deduplicating re-invocations of the same step
    pub fn idempotency_key(&self) -> String {
        if self.is_compensation {
            format!("{}:{}:compensate", self.execution_id, self.alias)
        } else {
            format!("{}:{}", self.execution_id, self.alias)
        }
    }
}

/// Executes registry actions on behalf of chain steps
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        request: ActionRequest,
        cancel: CancellationToken,
    ) -> Result<Value, ActionError>;
}

/// In-process implementation of one `(action_type, version)`
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        request: ActionRequest,
        cancel: CancellationToken,
    ) -> Result<Value, ActionError>;
}

/// Adapts an async closure into an [`ActionHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    async fn handle(
        &self,
        request: ActionRequest,
        _cancel: CancellationToken,
    ) -> Result<Value, ActionError> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ActionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    FnHandler(f)
}

/// Routes requests to handlers registered per `(action_type, version)`
#[derive(Default, Clone)]
pub struct ActionRouter {
    handlers: HashMap<(String, u32), Arc<dyn ActionHandler>>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        action_type: impl Into<String>,
        version: u32,
        handler: impl ActionHandler + 'static,
    ) -> &mut Self {
        self.handlers
            .insert((action_type.into(), version), Arc::new(handler));
        self
    }

    pub fn with_handler(
        mut self,
        action_type: impl Into<String>,
        version: u32,
        handler: impl ActionHandler + 'static,
    ) -> Self {
        self.register(action_type, version, handler);
        self
    }

    pub fn handles(&self, action_type: &str, version: u32) -> bool {
        self.handlers
            .contains_key(&(action_type.to_string(), version))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl ActionExecutor for ActionRouter {
    async fn execute(
        &self,
        request: ActionRequest,
        cancel: CancellationToken,
    ) -> Result<Value, ActionError> {
        let handler = self
            .handlers
            .get(&(request.action_type.clone(), request.version))
            .cloned()
            .ok_or_else(|| ActionError::Unhandled {
                action_type: request.action_type.clone(),
                version: request.version,
            })?;
        handler.handle(request, cancel).await
    }
}
