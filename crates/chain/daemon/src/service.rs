//! Chain command service
//!
//! The caller-facing contract: definition authoring, manual execution,
//! trigger ingestion and execution queries. Every operation is scoped to a
//! family; a record of another family is reported as not found. Authoring
//! failures persist nothing. Executions are persisted `Pending` and handed to
//! the dispatcher; the call returns without waiting for them.

use crate::dispatch::{Dispatcher, WorkItem};
use crate::error::{DispatchError, ServiceError, ServiceResult};
use crate::outbox::EventOutbox;
use crate::storage::{ExecutionFilter, Storage};
use chain_types::{
    ChainDefinition, ChainDefinitionId, ChainDefinitionStep, ChainError, ChainExecution,
    ChainExecutionId, ExecutionStatus, FamilyId, NewChainDefinition, Registry, TriggerEventId,
    UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Create a definition with its steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChainDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_by_user_id: UserId,
    pub trigger_event_type: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub steps: Vec<ChainDefinitionStep>,
}

/// Replace a definition's scalar fields and, when given, all of its steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChainDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<ChainDefinitionStep>>,
    /// Expected stored version, for optimistic concurrency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// A domain event delivered to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_type: String,
    /// Upstream event id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone)]
pub struct ChainService {
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
    dispatcher: Dispatcher,
    outbox: Arc<dyn EventOutbox>,
}

impl ChainService {
    pub fn new(
        registry: Arc<Registry>,
        storage: Arc<dyn Storage>,
        dispatcher: Dispatcher,
        outbox: Arc<dyn EventOutbox>,
    ) -> Self {
        Self {
            registry,
            storage,
            dispatcher,
            outbox,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ── Definitions ──────────────────────────────────────────────────

    pub async fn create_definition(
        &self,
        family_id: FamilyId,
        command: CreateChainDefinition,
    ) -> ServiceResult<ChainDefinition> {
        let (mut definition, event) = ChainDefinition::create(
            &self.registry,
            NewChainDefinition {
                name: command.name,
                description: command.description,
                family_id,
                created_by_user_id: command.created_by_user_id,
                trigger_event_type: command.trigger_event_type,
                is_enabled: command.is_enabled,
            },
        )?;
        for step in command.steps {
            definition.add_step(&self.registry, step)?;
        }

        self.storage.insert_definition(&mut definition).await?;
        tracing::info!(
            definition_id = %definition.id,
            family_id = %family_id,
            trigger = %definition.trigger_event_type,
            steps = definition.step_count(),
            "Chain definition created"
        );
        self.outbox.publish(event);
        Ok(definition)
    }

    pub async fn update_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
        command: UpdateChainDefinition,
    ) -> ServiceResult<ChainDefinition> {
        let mut definition = self.load_definition(family_id, id).await?;
        if let Some(expected) = command.version {
            if expected != definition.version {
                return Err(ServiceError::InvalidState(format!(
                    "chain definition {} is at version {}, not {}",
                    id, definition.version, expected
                )));
            }
        }

        let event = definition.update(command.name, command.description, command.is_enabled)?;
        if let Some(steps) = command.steps {
            definition.clear_steps();
            for step in steps {
                definition.add_step(&self.registry, step)?;
            }
        }

        self.storage.save_definition(&mut definition).await?;
        tracing::info!(definition_id = %id, version = definition.version, "Chain definition updated");
        self.outbox.publish(event);
        Ok(definition)
    }

    pub async fn delete_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
    ) -> ServiceResult<()> {
        let definition = self.load_definition(family_id, id).await?;
        if !self.storage.delete_definition(&id).await? {
            return Err(not_found("chain definition", id));
        }
        tracing::info!(definition_id = %id, "Chain definition deleted");
        self.outbox.publish(definition.deleted_event());
        Ok(())
    }

    pub async fn enable_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
    ) -> ServiceResult<ChainDefinition> {
        let mut definition = self.load_definition(family_id, id).await?;
        let event = definition.enable();
        self.storage.save_definition(&mut definition).await?;
        tracing::info!(definition_id = %id, "Chain definition enabled");
        self.outbox.publish(event);
        Ok(definition)
    }

    pub async fn disable_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
    ) -> ServiceResult<ChainDefinition> {
        let mut definition = self.load_definition(family_id, id).await?;
        let event = definition.disable();
        self.storage.save_definition(&mut definition).await?;
        tracing::info!(definition_id = %id, "Chain definition disabled");
        self.outbox.publish(event);
        Ok(definition)
    }

    pub async fn get_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
    ) -> ServiceResult<ChainDefinition> {
        self.load_definition(family_id, id).await
    }

    pub async fn list_definitions(
        &self,
        family_id: FamilyId,
        enabled: Option<bool>,
    ) -> ServiceResult<Vec<ChainDefinition>> {
        Ok(self.storage.list_definitions(&family_id, enabled).await?)
    }

    // ── Executions ───────────────────────────────────────────────────

    /// Start a definition by hand with a caller-supplied payload
    ///
    /// A disabled definition still gets an execution, which the worker fails
    /// without invoking any action.
    pub async fn execute_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
        payload: Value,
    ) -> ServiceResult<ChainExecution> {
        let definition = self.load_definition(family_id, id).await?;
        self.start_execution(&definition, TriggerEventId::generate(), payload)
            .await
    }

    /// Start one execution per enabled definition listening on the event type
    pub async fn ingest_event(
        &self,
        family_id: FamilyId,
        event: TriggerEvent,
    ) -> ServiceResult<Vec<ChainExecution>> {
        if !self.registry.is_valid_trigger(&event.event_type) {
            return Err(ChainError::UnknownTrigger(event.event_type).into());
        }
        let event_id = event
            .event_id
            .map(TriggerEventId::new)
            .unwrap_or_else(TriggerEventId::generate);

        let definitions = self
            .storage
            .list_definitions(&family_id, Some(true))
            .await?
            .into_iter()
            .filter(|d| d.trigger_event_type == event.event_type);

        let mut executions = Vec::new();
        for definition in definitions {
            match self
                .start_execution(&definition, event_id.clone(), event.payload.clone())
                .await
            {
                Ok(execution) => executions.push(execution),
                Err(err) => {
                    // Executions already started stay persisted and queued.
                    tracing::error!(
                        family_id = %family_id,
                        event_type = %event.event_type,
                        event_id = %event_id,
                        definition_id = %definition.id,
                        started = executions.len(),
                        started_ids = ?executions.iter().map(|e| e.id).collect::<Vec<_>>(),
                        error = %err,
                        "Trigger fan-out stopped partway"
                    );
                    return Err(err);
                }
            }
        }

        tracing::info!(
            family_id = %family_id,
            event_type = %event.event_type,
            event_id = %event_id,
            executions = executions.len(),
            "Trigger event ingested"
        );
        Ok(executions)
    }

    pub async fn get_execution(
        &self,
        family_id: FamilyId,
        id: ChainExecutionId,
    ) -> ServiceResult<ChainExecution> {
        self.load_execution(family_id, id).await
    }

    pub async fn list_executions(
        &self,
        family_id: FamilyId,
        definition_id: Option<ChainDefinitionId>,
        status: Option<ExecutionStatus>,
    ) -> ServiceResult<Vec<ChainExecution>> {
        let filter = ExecutionFilter {
            family_id,
            definition_id,
            status,
        };
        Ok(self.storage.list_executions(&filter).await?)
    }

    /// Request cancellation of an unfinished execution
    ///
    /// Returns the execution as stored at the time of the request; the worker
    /// records the outcome asynchronously.
    pub async fn cancel_execution(
        &self,
        family_id: FamilyId,
        id: ChainExecutionId,
    ) -> ServiceResult<ChainExecution> {
        let execution = self.load_execution(family_id, id).await?;
        if execution.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "chain execution {} is already {}",
                id, execution.status
            )));
        }

        let in_flight = self.dispatcher.cancel(id);
        tracing::info!(execution_id = %id, in_flight, "Cancellation requested");
        if !in_flight {
            self.enqueue(WorkItem::run(id));
        }
        Ok(execution)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn start_execution(
        &self,
        definition: &ChainDefinition,
        trigger_event_id: TriggerEventId,
        payload: Value,
    ) -> ServiceResult<ChainExecution> {
        let mut execution = ChainExecution::for_definition(definition, trigger_event_id, payload)?;
        self.storage.insert_execution(&mut execution).await?;
        tracing::info!(
            execution_id = %execution.id,
            definition_id = %definition.id,
            trigger_event_id = %execution.trigger_event_id,
            "Chain execution requested"
        );
        self.outbox.publish(execution.requested_event());
        self.enqueue(WorkItem::run(execution.id));
        Ok(execution)
    }

    fn enqueue(&self, item: WorkItem) {
        match self.dispatcher.dispatch(item) {
            Ok(()) => {}
            Err(DispatchError::QueueFull) => {
                tracing::warn!(
                    execution_id = %item.execution_id,
                    "Work queue full, execution left pending for the sweep"
                );
            }
            Err(DispatchError::Closed) => {
                tracing::warn!(
                    execution_id = %item.execution_id,
                    "Worker pool stopped, execution left pending for recovery"
                );
            }
        }
    }

    async fn load_definition(
        &self,
        family_id: FamilyId,
        id: ChainDefinitionId,
    ) -> ServiceResult<ChainDefinition> {
        match self.storage.get_definition(&id).await? {
            Some(definition) if definition.family_id == family_id => Ok(definition),
            _ => Err(not_found("chain definition", id)),
        }
    }

    async fn load_execution(
        &self,
        family_id: FamilyId,
        id: ChainExecutionId,
    ) -> ServiceResult<ChainExecution> {
        match self.storage.get_execution(&id).await? {
            Some(execution) if execution.family_id == family_id => Ok(execution),
            _ => Err(not_found("chain execution", id)),
        }
    }
}

fn not_found(kind: &str, id: impl std::fmt::Display) -> ServiceError {
    ServiceError::NotFound(format!("{} {}", kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{work_queue, WorkQueue};
    use crate::outbox::BroadcastOutbox;
    use crate::error::StorageError;
    use crate::storage::{DefinitionStorage, ExecutionStorage, InMemoryStorage, StorageResult};
    use chain_types::{ActionDescriptor, ChainEvent, TriggerDescriptor};
    use serde_json::json;
    use tokio::sync::broadcast;

    struct Fixture {
        service: ChainService,
        storage: Arc<InMemoryStorage>,
        queue: WorkQueue,
        events: broadcast::Receiver<ChainEvent>,
    }

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .add_trigger(TriggerDescriptor::new("chore.completed", "chores"))
            .unwrap()
            .add_trigger(TriggerDescriptor::new("member.joined", "family"))
            .unwrap()
            .add_action(ActionDescriptor::new("tasks.create", 1, "tasks").compensated_by("tasks.delete"))
            .unwrap()
            .add_action(ActionDescriptor::new("tasks.delete", 1, "tasks"))
            .unwrap();
        builder.build()
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let (dispatcher, queue) = work_queue(16);
        let outbox = BroadcastOutbox::new(64);
        let events = outbox.subscribe();
        Fixture {
            service: ChainService::new(
                Arc::new(registry()),
                storage.clone(),
                dispatcher,
                Arc::new(outbox),
            ),
            storage,
            queue,
            events,
        }
    }

    fn create_command(trigger: &str) -> CreateChainDefinition {
        CreateChainDefinition {
            name: "chore reward".to_string(),
            description: String::new(),
            created_by_user_id: UserId::generate(),
            trigger_event_type: trigger.to_string(),
            is_enabled: true,
            steps: vec![ChainDefinitionStep::new("task", "tasks.create", 1, 1)
                .with_input("title", "trigger.chore")
                .compensatable()],
        }
    }

    #[tokio::test]
    async fn test_create_persists_and_publishes() {
        let mut fx = fixture();
        let family = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();

        assert_eq!(definition.version, 1);
        assert_eq!(
            definition.steps[0].compensation_action_type.as_deref(),
            Some("tasks.delete")
        );
        assert!(fx.storage.get_definition(&definition.id).await.unwrap().is_some());
        assert_eq!(fx.events.recv().await.unwrap().name(), "definition_created");
    }

    #[tokio::test]
    async fn test_unknown_trigger_persists_nothing() {
        let fx = fixture();
        let family = FamilyId::generate();
        let err = fx
            .service
            .create_definition(family, create_command("nope.happened"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Validation(ChainError::UnknownTrigger(_))
        ));
        assert!(fx.service.list_definitions(family, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_step_persists_nothing() {
        let fx = fixture();
        let family = FamilyId::generate();
        let mut command = create_command("chore.completed");
        command
            .steps
            .push(ChainDefinitionStep::new("task", "tasks.create", 1, 2));

        let err = fx.service.create_definition(family, command).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ChainError::DuplicateAlias(_))
        ));
        assert!(fx.service.list_definitions(family, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_family_access_is_not_found() {
        let fx = fixture();
        let owner = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(owner, create_command("chore.completed"))
            .await
            .unwrap();

        let other = FamilyId::generate();
        assert!(matches!(
            fx.service.get_definition(other, definition.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.disable_definition(other, definition.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(fx.service.get_definition(owner, definition.id).await.unwrap().is_enabled);
    }

    #[tokio::test]
    async fn test_update_replaces_steps() {
        let fx = fixture();
        let family = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();

        let updated = fx
            .service
            .update_definition(
                family,
                definition.id,
                UpdateChainDefinition {
                    name: "renamed".to_string(),
                    description: "two steps".to_string(),
                    is_enabled: false,
                    steps: Some(vec![
                        ChainDefinitionStep::new("second", "tasks.delete", 1, 2),
                        ChainDefinitionStep::new("first", "tasks.create", 1, 1),
                    ]),
                    version: Some(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert!(!updated.is_enabled);
        let aliases: Vec<_> = updated.steps.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_is_rejected() {
        let fx = fixture();
        let family = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();
        fx.service
            .disable_definition(family, definition.id)
            .await
            .unwrap();

        let err = fx
            .service
            .update_definition(
                family,
                definition.id,
                UpdateChainDefinition {
                    name: "late".to_string(),
                    description: String::new(),
                    is_enabled: true,
                    steps: None,
                    version: Some(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_stored_definition() {
        let fx = fixture();
        let family = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();

        let err = fx
            .service
            .update_definition(
                family,
                definition.id,
                UpdateChainDefinition {
                    name: "broken".to_string(),
                    description: String::new(),
                    is_enabled: true,
                    steps: Some(vec![ChainDefinitionStep::new("x", "tasks.create", 9, 1)]),
                    version: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ChainError::UnknownAction { .. })
        ));

        let stored = fx.service.get_definition(family, definition.id).await.unwrap();
        assert_eq!(stored, definition);
    }

    #[tokio::test]
    async fn test_execute_persists_pending_and_enqueues() {
        let fx = fixture();
        let family = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();

        let first = fx
            .service
            .execute_definition(family, definition.id, json!({ "chore": "dishes" }))
            .await
            .unwrap();
        let second = fx
            .service
            .execute_definition(family, definition.id, json!({ "chore": "laundry" }))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.trigger_event_id, second.trigger_event_id);
        assert_eq!(first.status, ExecutionStatus::Pending);
        assert_eq!(first.step_executions.len(), 1);
        assert_ne!(first.step_executions[0].id, second.step_executions[0].id);

        assert_eq!(fx.queue.recv().await, Some(WorkItem::run(first.id)));
        assert_eq!(fx.queue.recv().await, Some(WorkItem::run(second.id)));
    }

    #[tokio::test]
    async fn test_ingest_fans_out_to_enabled_listeners() {
        let fx = fixture();
        let family = FamilyId::generate();
        let listening = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();
        let disabled = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();
        fx.service
            .disable_definition(family, disabled.id)
            .await
            .unwrap();
        fx.service
            .create_definition(family, create_command("member.joined"))
            .await
            .unwrap();
        fx.service
            .create_definition(FamilyId::generate(), create_command("chore.completed"))
            .await
            .unwrap();

        let executions = fx
            .service
            .ingest_event(
                family,
                TriggerEvent {
                    event_type: "chore.completed".to_string(),
                    event_id: Some("evt-7".to_string()),
                    payload: json!({ "chore": "dishes" }),
                },
            )
            .await
            .unwrap();

        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].chain_definition_id, listening.id);
        assert_eq!(executions[0].trigger_event_id.as_str(), "evt-7");
    }

    /// Delegates to memory storage but refuses execution inserts after a quota
    struct InsertQuota {
        inner: InMemoryStorage,
        remaining: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DefinitionStorage for InsertQuota {
        async fn get_definition(
            &self,
            id: &ChainDefinitionId,
        ) -> StorageResult<Option<ChainDefinition>> {
            self.inner.get_definition(id).await
        }

        async fn list_definitions(
            &self,
            family_id: &FamilyId,
            enabled: Option<bool>,
        ) -> StorageResult<Vec<ChainDefinition>> {
            self.inner.list_definitions(family_id, enabled).await
        }

        async fn insert_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()> {
            self.inner.insert_definition(definition).await
        }

        async fn save_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()> {
            self.inner.save_definition(definition).await
        }

        async fn delete_definition(&self, id: &ChainDefinitionId) -> StorageResult<bool> {
            self.inner.delete_definition(id).await
        }
    }

    #[async_trait::async_trait]
    impl ExecutionStorage for InsertQuota {
        async fn insert_execution(&self, execution: &mut ChainExecution) -> StorageResult<()> {
            use std::sync::atomic::Ordering;
            let granted = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !granted {
                return Err(StorageError::Connection("pool exhausted".to_string()));
            }
            self.inner.insert_execution(execution).await
        }

        async fn save_execution(&self, execution: &mut ChainExecution) -> StorageResult<()> {
            self.inner.save_execution(execution).await
        }

        async fn get_execution(
            &self,
            id: &ChainExecutionId,
        ) -> StorageResult<Option<ChainExecution>> {
            self.inner.get_execution(id).await
        }

        async fn list_executions(
            &self,
            filter: &ExecutionFilter,
        ) -> StorageResult<Vec<ChainExecution>> {
            self.inner.list_executions(filter).await
        }

        async fn list_unfinished_executions(&self) -> StorageResult<Vec<ChainExecution>> {
            self.inner.list_unfinished_executions().await
        }
    }

    #[tokio::test]
    async fn test_failed_fan_out_keeps_started_executions() {
        let storage = Arc::new(InsertQuota {
            inner: InMemoryStorage::new(),
            remaining: std::sync::atomic::AtomicUsize::new(1),
        });
        let (dispatcher, queue) = work_queue(16);
        let service = ChainService::new(
            Arc::new(registry()),
            storage.clone(),
            dispatcher,
            Arc::new(BroadcastOutbox::default()),
        );
        let family = FamilyId::generate();
        for _ in 0..2 {
            service
                .create_definition(family, create_command("chore.completed"))
                .await
                .unwrap();
        }

        let err = service
            .ingest_event(
                family,
                TriggerEvent {
                    event_type: "chore.completed".to_string(),
                    event_id: Some("evt-9".to_string()),
                    payload: json!({ "chore": "laundry" }),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(StorageError::Connection(_))
        ));

        let stored = storage.list_unfinished_executions().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].trigger_event_id.as_str(), "evt-9");
        assert_eq!(queue.recv().await.unwrap().execution_id, stored[0].id);
    }

    #[tokio::test]
    async fn test_ingest_unknown_event_type() {
        let fx = fixture();
        let err = fx
            .service
            .ingest_event(
                FamilyId::generate(),
                TriggerEvent {
                    event_type: "nope".to_string(),
                    event_id: None,
                    payload: Value::Null,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ChainError::UnknownTrigger(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_queued_execution_pre_cancels() {
        let fx = fixture();
        let family = FamilyId::generate();
        let definition = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();
        let execution = fx
            .service
            .execute_definition(family, definition.id, json!({}))
            .await
            .unwrap();

        fx.service.cancel_execution(family, execution.id).await.unwrap();

        let token = fx.service.dispatcher.tracker().claim(execution.id).unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_list_executions_filters() {
        let fx = fixture();
        let family = FamilyId::generate();
        let a = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();
        let b = fx
            .service
            .create_definition(family, create_command("chore.completed"))
            .await
            .unwrap();
        fx.service.execute_definition(family, a.id, json!({})).await.unwrap();
        fx.service.execute_definition(family, a.id, json!({})).await.unwrap();
        fx.service.execute_definition(family, b.id, json!({})).await.unwrap();

        assert_eq!(
            fx.service.list_executions(family, None, None).await.unwrap().len(),
            3
        );
        assert_eq!(
            fx.service
                .list_executions(family, Some(a.id), None)
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(fx
            .service
            .list_executions(family, None, Some(ExecutionStatus::Completed))
            .await
            .unwrap()
            .is_empty());
        assert!(fx
            .service
            .list_executions(FamilyId::generate(), None, None)
            .await
            .unwrap()
            .is_empty());
    }
}
