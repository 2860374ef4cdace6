//! Saga compensation: undo succeeded steps after a failure
//!
//! The walk visits steps in reverse step order. Each `Succeeded` step that is
//! compensatable gets its compensation action invoked (same version as the
//! original action) with `{ "inputs": ..., "output": ... }` of the original
//! invocation, and ends `Compensated`.
//!
//! A failing compensation stops the walk: the execution settles `Failed` with
//! `CompensationStatus::Failed` and nothing further is attempted. Succeeded
//! steps that are not compensatable keep their side effects, which is reported
//! as `CompensationStatus::PartiallyCompensated`.
//!
//! Compensation ignores operator cancellation; it is bounded by the
//! compensation timeout only.

use crate::error::{ActionError, EngineResult};
use crate::executor::ActionRequest;
use crate::orchestrator::{save, ChainOrchestrator, ExecutionCheckpoint};
use chain_types::{ChainEvent, ChainExecution, CompensationStatus, StepStatus};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

impl ChainOrchestrator {
    /// Run (or resume) the compensation walk of a `Compensating` execution
    pub(crate) async fn compensate(
        &self,
        execution: &mut ChainExecution,
        checkpoint: &dyn ExecutionCheckpoint,
    ) -> EngineResult<ChainEvent> {
        let unbounded = CancellationToken::new();

        for index in (0..execution.step_executions.len()).rev() {
            if !execution.step_executions[index].needs_compensation() {
                continue;
            }

            let step = &execution.step_executions[index];
            let alias = step.alias.clone();
            let result = match step.compensation_action_type.clone() {
                Some(action_type) => {
                    let request = ActionRequest {
                        execution_id: execution.id,
                        alias: alias.clone(),
                        action_type,
                        version: step.action_version,
                        inputs: compensation_inputs(
                            step.inputs.clone().unwrap_or_default(),
                            step.output.clone().unwrap_or(Value::Null),
                        ),
                        is_compensation: true,
                    };
                    tracing::info!(
                        execution_id = %execution.id,
                        alias = %alias,
                        action = %request.action_type,
                        "Compensating step"
                    );
                    self.invoke(request, self.config().compensation_timeout, &unbounded)
                        .await
                }
                None => Err(ActionError::failed("no compensation action recorded")),
            };

            match result {
                Ok(_) => {
                    execution.step_executions[index].mark_compensated()?;
                    save(checkpoint, execution).await?;
                }
                Err(err) => {
                    tracing::error!(
                        execution_id = %execution.id,
                        alias = %alias,
                        error = %err,
                        "Compensation failed, manual intervention required"
                    );
                    execution.step_executions[index].record_compensation_failure(err.to_string())?;
                    let event = execution.finish_compensation(CompensationStatus::Failed)?;
                    save(checkpoint, execution).await?;
                    return Ok(event);
                }
            }
        }

        let outcome = compensation_outcome(execution);
        let event = execution.finish_compensation(outcome)?;
        save(checkpoint, execution).await?;
        tracing::info!(
            execution_id = %execution.id,
            compensation = %outcome,
            "Execution failed"
        );
        Ok(event)
    }
}

fn compensation_inputs(inputs: Map<String, Value>, output: Value) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("inputs".to_string(), Value::Object(inputs));
    payload.insert("output".to_string(), output);
    payload
}

/// Classify a finished walk that hit no compensation failure
fn compensation_outcome(execution: &ChainExecution) -> CompensationStatus {
    let mut compensated = false;
    for step in &execution.step_executions {
        match step.status {
            StepStatus::Succeeded => return CompensationStatus::PartiallyCompensated,
            StepStatus::Compensated => compensated = true,
            _ => {}
        }
    }
    if compensated {
        CompensationStatus::Compensated
    } else {
        CompensationStatus::NotRequired
    }
}
