//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use chain_types::{
    ChainDefinition, ChainDefinitionId, ChainExecution, ChainExecutionId, ExecutionStatus,
    FamilyId,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Combined storage trait
pub trait Storage: DefinitionStorage + ExecutionStorage + Send + Sync {}

impl<T> Storage for T where T: DefinitionStorage + ExecutionStorage + Send + Sync {}

/// Storage for chain definitions
///
/// Writes are version-checked: `insert_definition` stores version 1 and every
/// successful `save_definition` advances the version by one, writing the new
/// value back into the caller's copy.
#[async_trait]
pub trait DefinitionStorage: Send + Sync {
    /// Get a definition with its steps
    async fn get_definition(&self, id: &ChainDefinitionId)
        -> StorageResult<Option<ChainDefinition>>;

    /// List a family's definitions, oldest first, optionally by enabled flag
    async fn list_definitions(
        &self,
        family_id: &FamilyId,
        enabled: Option<bool>,
    ) -> StorageResult<Vec<ChainDefinition>>;

    /// Store a new definition; `Conflict` if the id exists
    async fn insert_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()>;

    /// Replace a definition; `Conflict` if the stored version moved on
    async fn save_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()>;

    /// Delete a definition by ID
    async fn delete_definition(&self, id: &ChainDefinitionId) -> StorageResult<bool>;
}

/// Filter for listing executions
#[derive(Debug, Clone)]
pub struct ExecutionFilter {
    pub family_id: FamilyId,
    pub definition_id: Option<ChainDefinitionId>,
    pub status: Option<ExecutionStatus>,
}

impl ExecutionFilter {
    pub fn family(family_id: FamilyId) -> Self {
        Self {
            family_id,
            definition_id: None,
            status: None,
        }
    }

    pub fn matches(&self, execution: &ChainExecution) -> bool {
        execution.family_id == self.family_id
            && self
                .definition_id
                .map_or(true, |id| execution.chain_definition_id == id)
            && self.status.map_or(true, |status| execution.status == status)
    }
}

/// Storage for chain executions, serialized per execution id by version
#[async_trait]
pub trait ExecutionStorage: Send + Sync {
    /// Store a new execution with its step records
    async fn insert_execution(&self, execution: &mut ChainExecution) -> StorageResult<()>;

    /// Replace an execution; `Conflict` if the stored version moved on
    async fn save_execution(&self, execution: &mut ChainExecution) -> StorageResult<()>;

    /// Get an execution with its step records
    async fn get_execution(&self, id: &ChainExecutionId) -> StorageResult<Option<ChainExecution>>;

    /// List executions, newest first
    async fn list_executions(&self, filter: &ExecutionFilter)
        -> StorageResult<Vec<ChainExecution>>;

    /// Every `Pending`, `Running` or `Compensating` execution, oldest first
    async fn list_unfinished_executions(&self) -> StorageResult<Vec<ChainExecution>>;
}
