//! Chain executions: one run of a chain definition for one trigger occurrence
//!
//! A ChainExecution is created `Pending` with one StepExecution per
//! definition step, in step order, before any step runs. That snapshot is
//! authoritative for the run even if the definition changes later.
//!
//! Execution lifecycle:
//!
//! ```text
//! Pending ──> Running ──> Completed
//!    │           │
//!    │           └──> Compensating ──> Failed
//!    └──> Failed
//! ```
//!
//! Step lifecycle: `Pending -> Running -> {Succeeded | Failed | Skipped |
//! Cancelled}`, `Succeeded -> Compensated`, and `Pending -> NotRun` when the
//! execution is cancelled. A step never re-enters `Running`.

use crate::{
    ChainDefinition, ChainDefinitionId, ChainDefinitionStep, ChainError, ChainEvent,
    ChainExecutionId, ChainResult, FamilyId, StepExecutionId, StepExpressions, TriggerEventId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ── Statuses ─────────────────────────────────────────────────────────

/// The lifecycle state of a chain execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    /// Undoing succeeded steps after a failure; always settles to `Failed`
    Compensating,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Compensating => "compensating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "compensating" => Ok(Self::Compensating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ChainError::UnknownStatus(other.to_string())),
        }
    }
}

/// The lifecycle state of one step within an execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Condition evaluated false; produced no output
    Skipped,
    /// Undone by its compensation action
    Compensated,
    /// Interrupted by cancellation while running
    Cancelled,
    /// Never started because the execution was cancelled
    NotRun,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Compensated => "compensated",
            Self::Cancelled => "cancelled",
            Self::NotRun => "not_run",
        }
    }

    /// Whether forward processing of this step is finished
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Failure record ───────────────────────────────────────────────────

/// Why an execution ended `Failed`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The definition was disabled when the execution started
    ChainDisabled,
    /// A step failed (action error, mapping error or timeout)
    StepFailed { alias: String },
    /// Cancelled by an operator
    Cancelled,
    /// Left unfinished by a crashed worker and failed during recovery
    Interrupted,
    /// The definition no longer exists
    DefinitionMissing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    #[serde(flatten)]
    pub cause: FailureCause,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }
}

/// Outcome of the compensation walk on the failure path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStatus {
    /// No step had succeeded, nothing to undo
    NotRequired,
    /// Every succeeded step was undone
    Compensated,
    /// Non-compensatable steps left side effects in place
    PartiallyCompensated,
    /// A compensation action failed; manual intervention required
    Failed,
}

impl CompensationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Compensated => "compensated",
            Self::PartiallyCompensated => "partially_compensated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CompensationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Step Execution ───────────────────────────────────────────────────

/// Runtime record of one step within an execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: StepExecutionId,
    pub execution_id: ChainExecutionId,
    pub alias: String,
    pub name: String,
    pub action_type: String,
    pub action_version: u32,
    pub step_order: i32,
    pub is_compensatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_action_type: Option<String>,
    /// Input mappings as authored when the execution was created
    #[serde(default)]
    pub input_mappings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub status: StepStatus,
    /// Resolved inputs, recorded before the action is invoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExpressions for StepExecution {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn condition_source(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    fn input_mappings(&self) -> &BTreeMap<String, String> {
        &self.input_mappings
    }
}

impl StepExecution {
    /// A pending record for a definition step
    pub fn planned(execution_id: ChainExecutionId, step: &ChainDefinitionStep) -> Self {
        Self {
            id: StepExecutionId::generate(),
            execution_id,
            alias: step.alias.clone(),
            name: step.name.clone(),
            action_type: step.action_type.clone(),
            action_version: step.action_version,
            step_order: step.step_order,
            is_compensatable: step.is_compensatable,
            compensation_action_type: step.compensation_action_type.clone(),
            input_mappings: step.input_mappings.clone(),
            condition: step.condition.clone(),
            status: StepStatus::Pending,
            inputs: None,
            output: None,
            error: None,
            compensation_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self) -> ChainResult<()> {
        self.transition(&[StepStatus::Pending], StepStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_inputs(&mut self, inputs: Map<String, Value>) -> ChainResult<()> {
        self.guard(&[StepStatus::Running], StepStatus::Running)?;
        self.inputs = Some(inputs);
        Ok(())
    }

    pub fn mark_succeeded(&mut self, output: Value) -> ChainResult<()> {
        self.transition(&[StepStatus::Running], StepStatus::Succeeded)?;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> ChainResult<()> {
        self.transition(&[StepStatus::Running], StepStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_skipped(&mut self) -> ChainResult<()> {
        self.transition(&[StepStatus::Running], StepStatus::Skipped)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_cancelled(&mut self, reason: impl Into<String>) -> ChainResult<()> {
        self.transition(&[StepStatus::Running], StepStatus::Cancelled)?;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_not_run(&mut self) -> ChainResult<()> {
        self.transition(&[StepStatus::Pending], StepStatus::NotRun)
    }

    pub fn mark_compensated(&mut self) -> ChainResult<()> {
        self.transition(&[StepStatus::Succeeded], StepStatus::Compensated)?;
        self.compensation_error = None;
        Ok(())
    }

    /// Record a failed compensation; the step stays `Succeeded`
    pub fn record_compensation_failure(&mut self, error: impl Into<String>) -> ChainResult<()> {
        self.guard(&[StepStatus::Succeeded], StepStatus::Compensated)?;
        self.compensation_error = Some(error.into());
        Ok(())
    }

    /// Whether the compensation walk must undo this step
    pub fn needs_compensation(&self) -> bool {
        self.status == StepStatus::Succeeded && self.is_compensatable
    }

    fn transition(&mut self, allowed: &[StepStatus], to: StepStatus) -> ChainResult<()> {
        self.guard(allowed, to)?;
        self.status = to;
        Ok(())
    }

    fn guard(&self, allowed: &[StepStatus], to: StepStatus) -> ChainResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ChainError::InvalidStepTransition {
                alias: self.alias.clone(),
                from: self.status,
                to,
            })
        }
    }
}

// ── Chain Execution ──────────────────────────────────────────────────

/// The runtime record of one firing of a chain definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainExecution {
    pub id: ChainExecutionId,
    pub chain_definition_id: ChainDefinitionId,
    pub family_id: FamilyId,
    pub trigger_event_type: String,
    pub trigger_event_id: TriggerEventId,
    pub trigger_payload: Value,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// In definition step order, fixed in count and order once running
    pub step_executions: Vec<StepExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationStatus>,
    /// Optimistic concurrency counter, advanced by storage on every save
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ChainExecution {
    /// Start a pending execution with no step records
    pub fn start(
        chain_definition_id: ChainDefinitionId,
        family_id: FamilyId,
        trigger_event_type: impl Into<String>,
        trigger_event_id: TriggerEventId,
        trigger_payload: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ChainExecutionId::generate(),
            chain_definition_id,
            family_id,
            trigger_event_type: trigger_event_type.into(),
            trigger_event_id,
            trigger_payload,
            status: ExecutionStatus::Pending,
            started_at: now,
            completed_at: None,
            step_executions: Vec::new(),
            failure: None,
            compensation: None,
            version: 0,
            updated_at: now,
        }
    }

    /// Start an execution pre-populated with one step record per definition step
    pub fn for_definition(
        definition: &ChainDefinition,
        trigger_event_id: TriggerEventId,
        trigger_payload: Value,
    ) -> ChainResult<Self> {
        let mut execution = Self::start(
            definition.id,
            definition.family_id,
            definition.trigger_event_type.clone(),
            trigger_event_id,
            trigger_payload,
        );
        for step in &definition.steps {
            execution.add_step_execution(StepExecution::planned(execution.id, step))?;
        }
        Ok(execution)
    }

    /// Append a step record; only while pending, in non-decreasing step order
    pub fn add_step_execution(&mut self, mut step: StepExecution) -> ChainResult<()> {
        if self.status != ExecutionStatus::Pending {
            return Err(ChainError::InvalidExecutionTransition {
                from: self.status,
                to: ExecutionStatus::Pending,
            });
        }
        if let Some(last) = self.step_executions.last() {
            if step.step_order < last.step_order {
                return Err(ChainError::StepOrderViolation {
                    alias: step.alias,
                    step_order: step.step_order,
                    last_order: last.step_order,
                });
            }
        }
        if self.step(&step.alias).is_some() {
            return Err(ChainError::DuplicateAlias(step.alias));
        }
        step.execution_id = self.id;
        self.step_executions.push(step);
        self.touch();
        Ok(())
    }

    /// Event announcing that this execution awaits dispatch
    pub fn requested_event(&self) -> ChainEvent {
        ChainEvent::ExecutionRequested {
            execution_id: self.id,
            definition_id: self.chain_definition_id,
            family_id: self.family_id,
            trigger_event_id: self.trigger_event_id.clone(),
            at: self.started_at,
        }
    }

    pub fn mark_running(&mut self) -> ChainResult<()> {
        self.transition(&[ExecutionStatus::Pending], ExecutionStatus::Running)
    }

    /// Enter compensation after a step failure or cancellation
    pub fn begin_compensation(&mut self, failure: ExecutionFailure) -> ChainResult<()> {
        self.transition(&[ExecutionStatus::Running], ExecutionStatus::Compensating)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// Every step processed without a failure
    pub fn complete(&mut self) -> ChainResult<ChainEvent> {
        self.transition(&[ExecutionStatus::Running], ExecutionStatus::Completed)?;
        let now = Utc::now();
        self.completed_at = Some(now);
        Ok(ChainEvent::ExecutionCompleted {
            execution_id: self.id,
            definition_id: self.chain_definition_id,
            family_id: self.family_id,
            at: now,
        })
    }

    /// Fail before any step ran; nothing needs compensating
    pub fn fail(&mut self, failure: ExecutionFailure) -> ChainResult<ChainEvent> {
        self.transition(&[ExecutionStatus::Pending], ExecutionStatus::Failed)?;
        self.failure = Some(failure);
        self.settle(CompensationStatus::NotRequired)
    }

    /// Settle to `Failed` once the compensation walk is over
    pub fn finish_compensation(&mut self, outcome: CompensationStatus) -> ChainResult<ChainEvent> {
        self.transition(&[ExecutionStatus::Compensating], ExecutionStatus::Failed)?;
        self.settle(outcome)
    }

    pub fn step(&self, alias: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|s| s.alias == alias)
    }

    pub fn step_mut(&mut self, alias: &str) -> ChainResult<&mut StepExecution> {
        self.step_executions
            .iter_mut()
            .find(|s| s.alias == alias)
            .ok_or_else(|| ChainError::StepNotFound(alias.to_string()))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Refresh `updated_at` after mutating a step record
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn settle(&mut self, outcome: CompensationStatus) -> ChainResult<ChainEvent> {
        let now = Utc::now();
        self.compensation = Some(outcome);
        self.completed_at = Some(now);
        let cause = self
            .failure
            .as_ref()
            .map(|f| f.cause.clone())
            .unwrap_or(FailureCause::Interrupted);
        Ok(ChainEvent::ExecutionFailed {
            execution_id: self.id,
            definition_id: self.chain_definition_id,
            family_id: self.family_id,
            cause,
            compensation: outcome,
            at: now,
        })
    }

    fn transition(&mut self, allowed: &[ExecutionStatus], to: ExecutionStatus) -> ChainResult<()> {
        if !allowed.contains(&self.status) {
            return Err(ChainError::InvalidExecutionTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }
}
