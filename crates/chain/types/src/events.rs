//! Domain events returned by aggregate operations
//!
//! Aggregates never buffer events internally. Each operation that changes
//! observable state hands back a `ChainEvent`, and the caller forwards it to
//! an outbox once the change has been persisted.

use crate::{
    ChainDefinitionId, ChainExecutionId, CompensationStatus, FailureCause, FamilyId,
    TriggerEventId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    DefinitionCreated {
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        trigger_event_type: String,
        at: DateTime<Utc>,
    },
    DefinitionUpdated {
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        at: DateTime<Utc>,
    },
    DefinitionEnabled {
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        at: DateTime<Utc>,
    },
    DefinitionDisabled {
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        at: DateTime<Utc>,
    },
    DefinitionDeleted {
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        at: DateTime<Utc>,
    },
    ExecutionRequested {
        execution_id: ChainExecutionId,
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        trigger_event_id: TriggerEventId,
        at: DateTime<Utc>,
    },
    ExecutionCompleted {
        execution_id: ChainExecutionId,
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        at: DateTime<Utc>,
    },
    ExecutionFailed {
        execution_id: ChainExecutionId,
        definition_id: ChainDefinitionId,
        family_id: FamilyId,
        cause: FailureCause,
        compensation: CompensationStatus,
        at: DateTime<Utc>,
    },
}

impl ChainEvent {
    /// The tenant the event belongs to
    pub fn family_id(&self) -> FamilyId {
        match self {
            Self::DefinitionCreated { family_id, .. }
            | Self::DefinitionUpdated { family_id, .. }
            | Self::DefinitionEnabled { family_id, .. }
            | Self::DefinitionDisabled { family_id, .. }
            | Self::DefinitionDeleted { family_id, .. }
            | Self::ExecutionRequested { family_id, .. }
            | Self::ExecutionCompleted { family_id, .. }
            | Self::ExecutionFailed { family_id, .. } => *family_id,
        }
    }

    /// Stable event name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefinitionCreated { .. } => "definition_created",
            Self::DefinitionUpdated { .. } => "definition_updated",
            Self::DefinitionEnabled { .. } => "definition_enabled",
            Self::DefinitionDisabled { .. } => "definition_disabled",
            Self::DefinitionDeleted { .. } => "definition_deleted",
            Self::ExecutionRequested { .. } => "execution_requested",
            Self::ExecutionCompleted { .. } => "execution_completed",
            Self::ExecutionFailed { .. } => "execution_failed",
        }
    }
}
