//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chain_types::{
    ChainDefinition, ChainDefinitionId, ChainExecution, ChainExecutionId, FamilyId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    definitions: Arc<RwLock<HashMap<ChainDefinitionId, ChainDefinition>>>,
    executions: Arc<RwLock<HashMap<ChainExecutionId, ChainExecution>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_version(kind: &str, id: impl std::fmt::Display, stored: u64, given: u64) -> StorageResult<()> {
    if stored != given {
        return Err(StorageError::Conflict(format!(
            "{} {} is at version {}, not {}",
            kind, id, stored, given
        )));
    }
    Ok(())
}

#[async_trait]
impl DefinitionStorage for InMemoryStorage {
    async fn get_definition(
        &self,
        id: &ChainDefinitionId,
    ) -> StorageResult<Option<ChainDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(id).cloned())
    }

    async fn list_definitions(
        &self,
        family_id: &FamilyId,
        enabled: Option<bool>,
    ) -> StorageResult<Vec<ChainDefinition>> {
        let definitions = self.definitions.read().await;
        let mut result: Vec<_> = definitions
            .values()
            .filter(|d| d.family_id == *family_id)
            .filter(|d| enabled.map_or(true, |e| d.is_enabled == e))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn insert_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.id) {
            return Err(StorageError::Conflict(format!(
                "chain definition {} already exists",
                definition.id
            )));
        }
        definition.version = 1;
        definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn save_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()> {
        let mut definitions = self.definitions.write().await;
        let stored = definitions.get_mut(&definition.id).ok_or_else(|| {
            StorageError::NotFound(format!("chain definition {}", definition.id))
        })?;
        check_version("chain definition", definition.id, stored.version, definition.version)?;
        definition.version += 1;
        *stored = definition.clone();
        Ok(())
    }

    async fn delete_definition(&self, id: &ChainDefinitionId) -> StorageResult<bool> {
        let mut definitions = self.definitions.write().await;
        Ok(definitions.remove(id).is_some())
    }
}

#[async_trait]
impl ExecutionStorage for InMemoryStorage {
    async fn insert_execution(&self, execution: &mut ChainExecution) -> StorageResult<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(StorageError::Conflict(format!(
                "chain execution {} already exists",
                execution.id
            )));
        }
        execution.version = 1;
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn save_execution(&self, execution: &mut ChainExecution) -> StorageResult<()> {
        let mut executions = self.executions.write().await;
        let stored = executions.get_mut(&execution.id).ok_or_else(|| {
            StorageError::NotFound(format!("chain execution {}", execution.id))
        })?;
        check_version("chain execution", execution.id, stored.version, execution.version)?;
        execution.version += 1;
        *stored = execution.clone();
        Ok(())
    }

    async fn get_execution(&self, id: &ChainExecutionId) -> StorageResult<Option<ChainExecution>> {
        let executions = self.executions.read().await;
        Ok(executions.get(id).cloned())
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> StorageResult<Vec<ChainExecution>> {
        let executions = self.executions.read().await;
        let mut result: Vec<_> = executions
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn list_unfinished_executions(&self) -> StorageResult<Vec<ChainExecution>> {
        let executions = self.executions.read().await;
        let mut result: Vec<_> = executions
            .values()
            .filter(|e| !e.is_terminal())
            .cloned()
            .collect();
        result.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }
}
