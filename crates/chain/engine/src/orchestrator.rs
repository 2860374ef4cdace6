//! Chain Orchestrator: walks an execution through its step snapshot
//!
//! For each step, in step order:
//! 1. Mark the step running
//! 2. Evaluate its condition; false means `Skipped`, which is not a failure
//! 3. Resolve its input bindings; an unresolved reference fails the step
//! 4. Invoke the action under the step timeout
//! 5. On success record the output and expose it under the step alias
//!
//! The first failure stops forward progress and starts the compensation walk.
//! Every state change is handed to an [`ExecutionCheckpoint`] before the run
//! moves on, so a crashed run can be resumed from its last saved state.
//!
//! The orchestrator must not run the same execution twice concurrently;
//! the dispatch layer guarantees that.

use crate::context::BindingContext;
use crate::error::{ActionError, CheckpointError, EngineResult, MappingError};
use crate::executor::{ActionExecutor, ActionRequest};
use async_trait::async_trait;
use chain_types::{
    ChainDefinition, ChainEvent, ChainExecution, ExecutionFailure, ExecutionStatus,
    FailureCause, StepExecution, StepStatus,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Reason recorded on a step interrupted by a crashed worker
pub const INTERRUPTED_REASON: &str = "interrupted";

/// Timeouts applied to action invocations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound for one forward action invocation
    pub step_timeout: Duration,
    /// Upper bound for one compensation action invocation
    pub compensation_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            compensation_timeout: Duration::from_secs(30),
        }
    }
}

/// Persistence hook called after every state change
#[async_trait]
pub trait ExecutionCheckpoint: Send + Sync {
    async fn save(&self, execution: &mut ChainExecution) -> Result<(), CheckpointError>;
}

/// Checkpoint that persists nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCheckpoint;

#[async_trait]
impl ExecutionCheckpoint for NoopCheckpoint {
    async fn save(&self, _execution: &mut ChainExecution) -> Result<(), CheckpointError> {
        Ok(())
    }
}

/// Outcome of processing one step
enum StepOutcome {
    Succeeded(Value),
    Skipped,
    Failed(String),
    Cancelled,
}

/// Runs chain executions through the action-execution boundary
#[derive(Clone)]
pub struct ChainOrchestrator {
    executor: Arc<dyn ActionExecutor>,
    config: OrchestratorConfig,
}

impl ChainOrchestrator {
    pub fn new(executor: Arc<dyn ActionExecutor>, config: OrchestratorConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Drive an execution to a terminal state
    ///
    /// Pending executions start from the first step, `Running` ones resume at
    /// the first unsettled step and `Compensating` ones resume the
    /// compensation walk. Returns the terminal event, or `None` when the
    /// execution was already terminal.
    ///
    /// `definition` is only consulted for `is_enabled`; steps, conditions and
    /// bindings come from the execution's own step records.
    pub async fn run(
        &self,
        execution: &mut ChainExecution,
        definition: &ChainDefinition,
        checkpoint: &dyn ExecutionCheckpoint,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<ChainEvent>> {
        match execution.status {
            ExecutionStatus::Completed | ExecutionStatus::Failed => {
                tracing::debug!(execution_id = %execution.id, "Execution already terminal");
                return Ok(None);
            }
            ExecutionStatus::Compensating => {
                tracing::info!(execution_id = %execution.id, "Resuming compensation");
                return self.compensate(execution, checkpoint).await.map(Some);
            }
            ExecutionStatus::Pending => {
                if !definition.is_enabled {
                    tracing::info!(
                        execution_id = %execution.id,
                        definition_id = %definition.id,
                        "Chain disabled, failing execution"
                    );
                    let event = execution.fail(ExecutionFailure::new(
                        FailureCause::ChainDisabled,
                        "chain disabled",
                    ))?;
                    save(checkpoint, execution).await?;
                    return Ok(Some(event));
                }
                if cancel.is_cancelled() {
                    return self
                        .fail_pending(execution, FailureCause::Cancelled, "cancelled", checkpoint)
                        .await
                        .map(Some);
                }
                execution.mark_running()?;
                save(checkpoint, execution).await?;
                tracing::info!(
                    execution_id = %execution.id,
                    steps = execution.step_executions.len(),
                    "Execution started"
                );
            }
            ExecutionStatus::Running => {
                tracing::info!(execution_id = %execution.id, "Resuming execution");
            }
        }

        let mut context = BindingContext::rebuild(execution);

        for index in 0..execution.step_executions.len() {
            let status = execution.step_executions[index].status;
            match status {
                StepStatus::Failed | StepStatus::Cancelled => {
                    // Saved as settled before compensation was recorded
                    let step = &execution.step_executions[index];
                    let cause = if status == StepStatus::Cancelled {
                        FailureCause::Cancelled
                    } else {
                        FailureCause::StepFailed {
                            alias: step.alias.clone(),
                        }
                    };
                    let message = step.error.clone().unwrap_or_default();
                    return self
                        .fail_running(execution, cause, message, checkpoint)
                        .await;
                }
                status if status.is_settled() => continue,
                _ => {}
            }

            if cancel.is_cancelled() {
                return self.cancel_running(execution, index, checkpoint).await;
            }

            if status == StepStatus::Pending {
                execution.step_executions[index].mark_running()?;
                save(checkpoint, execution).await?;
            }

            let alias = execution.step_executions[index].alias.clone();
            match self
                .process_step(execution, index, &context, cancel)
                .await?
            {
                StepOutcome::Succeeded(output) => {
                    execution.step_executions[index].mark_succeeded(output.clone())?;
                    context.insert_output(&alias, output);
                    save(checkpoint, execution).await?;
                    tracing::info!(execution_id = %execution.id, alias = %alias, "Step succeeded");
                }
                StepOutcome::Skipped => {
                    execution.step_executions[index].mark_skipped()?;
                    save(checkpoint, execution).await?;
                    tracing::info!(
                        execution_id = %execution.id,
                        alias = %alias,
                        "Step skipped, condition not met"
                    );
                }
                StepOutcome::Failed(message) => {
                    tracing::warn!(
                        execution_id = %execution.id,
                        alias = %alias,
                        error = %message,
                        "Step failed"
                    );
                    execution.step_executions[index].mark_failed(message.clone())?;
                    let cause = FailureCause::StepFailed { alias };
                    return self
                        .fail_running(execution, cause, message, checkpoint)
                        .await;
                }
                StepOutcome::Cancelled => {
                    return self.cancel_running(execution, index, checkpoint).await;
                }
            }
        }

        let event = execution.complete()?;
        save(checkpoint, execution).await?;
        tracing::info!(execution_id = %execution.id, "Execution completed");
        Ok(Some(event))
    }

    /// Fail an execution without running further steps
    ///
    /// Used for operator cancellation of queued executions and for recovery
    /// of executions a crashed worker left behind. A pending execution fails
    /// directly with every step `NotRun`. A running one has its in-flight
    /// step failed with `reason` and then compensates. With
    /// `FailureCause::Cancelled` the remaining steps become `NotRun`,
    /// otherwise they stay `Pending`.
    pub async fn abandon(
        &self,
        execution: &mut ChainExecution,
        cause: FailureCause,
        reason: &str,
        checkpoint: &dyn ExecutionCheckpoint,
    ) -> EngineResult<Option<ChainEvent>> {
        tracing::warn!(
            execution_id = %execution.id,
            status = %execution.status,
            reason = reason,
            "Abandoning execution"
        );
        match execution.status {
            ExecutionStatus::Completed | ExecutionStatus::Failed => Ok(None),
            ExecutionStatus::Pending => self
                .fail_pending(execution, cause, reason, checkpoint)
                .await
                .map(Some),
            ExecutionStatus::Compensating => self.compensate(execution, checkpoint).await.map(Some),
            ExecutionStatus::Running => {
                let cancelled = cause == FailureCause::Cancelled;
                for step in execution.step_executions.iter_mut() {
                    match step.status {
                        StepStatus::Running if cancelled => step.mark_cancelled(reason)?,
                        StepStatus::Running => step.mark_failed(reason)?,
                        StepStatus::Pending if cancelled => step.mark_not_run()?,
                        _ => {}
                    }
                }
                self.fail_running(execution, cause, reason.to_string(), checkpoint)
                    .await
            }
        }
    }

    /// Evaluate, bind and invoke one running step
    async fn process_step(
        &self,
        execution: &mut ChainExecution,
        index: usize,
        context: &BindingContext,
        cancel: &CancellationToken,
    ) -> EngineResult<StepOutcome> {
        let alias = execution.step_executions[index].alias.clone();

        let inputs = match prepare(&execution.step_executions[index], context) {
            Ok(Some(inputs)) => inputs,
            Ok(None) => return Ok(StepOutcome::Skipped),
            Err(err) => return Ok(StepOutcome::Failed(err.to_string())),
        };
        execution.step_executions[index].record_inputs(inputs.clone())?;

        let step = &execution.step_executions[index];
        let request = ActionRequest {
            execution_id: execution.id,
            alias,
            action_type: step.action_type.clone(),
            version: step.action_version,
            inputs,
            is_compensation: false,
        };
        tracing::debug!(
            execution_id = %request.execution_id,
            alias = %request.alias,
            action = %request.action_type,
            version = request.version,
            "Invoking action"
        );

        Ok(
            match self.invoke(request, self.config.step_timeout, cancel).await {
                Ok(output) => StepOutcome::Succeeded(output),
                Err(ActionError::Cancelled) if cancel.is_cancelled() => StepOutcome::Cancelled,
                Err(err) => StepOutcome::Failed(err.to_string()),
            },
        )
    }

    /// Invoke an action under a timeout, racing the cancellation token
    pub(crate) async fn invoke(
        &self,
        request: ActionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, ActionError> {
        let action_cancel = cancel.child_token();
        let call = self.executor.execute(request, action_cancel.clone());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(result) => result,
                Err(_) => {
                    action_cancel.cancel();
                    Err(ActionError::TimedOut(timeout))
                }
            },
        }
    }

    async fn fail_pending(
        &self,
        execution: &mut ChainExecution,
        cause: FailureCause,
        reason: &str,
        checkpoint: &dyn ExecutionCheckpoint,
    ) -> EngineResult<ChainEvent> {
        for step in execution.step_executions.iter_mut() {
            if step.status == StepStatus::Pending {
                step.mark_not_run()?;
            }
        }
        let event = execution.fail(ExecutionFailure::new(cause, reason))?;
        save(checkpoint, execution).await?;
        tracing::info!(
            execution_id = %execution.id,
            reason = reason,
            "Execution failed before start"
        );
        Ok(event)
    }

    async fn cancel_running(
        &self,
        execution: &mut ChainExecution,
        index: usize,
        checkpoint: &dyn ExecutionCheckpoint,
    ) -> EngineResult<Option<ChainEvent>> {
        tracing::info!(execution_id = %execution.id, "Execution cancelled");
        for step in execution.step_executions[index..].iter_mut() {
            match step.status {
                StepStatus::Running => step.mark_cancelled("cancelled")?,
                StepStatus::Pending => step.mark_not_run()?,
                _ => {}
            }
        }
        self.fail_running(execution, FailureCause::Cancelled, "cancelled".to_string(), checkpoint)
            .await
    }

    async fn fail_running(
        &self,
        execution: &mut ChainExecution,
        cause: FailureCause,
        message: String,
        checkpoint: &dyn ExecutionCheckpoint,
    ) -> EngineResult<Option<ChainEvent>> {
        execution.begin_compensation(ExecutionFailure::new(cause, message))?;
        save(checkpoint, execution).await?;
        self.compensate(execution, checkpoint).await.map(Some)
    }
}

/// Condition and bindings of a step; `None` means the condition was false
fn prepare(
    step: &StepExecution,
    context: &BindingContext,
) -> Result<Option<Map<String, Value>>, MappingError> {
    if !context.should_run(step)? {
        return Ok(None);
    }
    context.resolve_inputs(step).map(Some)
}

pub(crate) async fn save(
    checkpoint: &dyn ExecutionCheckpoint,
    execution: &mut ChainExecution,
) -> Result<(), CheckpointError> {
    execution.touch();
    checkpoint.save(execution).await.map_err(|err| {
        tracing::error!(execution_id = %execution.id, error = %err, "Checkpoint failed");
        err
    })
}
