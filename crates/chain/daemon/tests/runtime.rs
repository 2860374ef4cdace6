//! Chain runtime end to end: service, queue, workers and recovery over in-memory storage

use async_trait::async_trait;
use chain_daemon::config::ChainDaemonConfig;
use chain_daemon::dispatch::RecoveryMode;
use chain_daemon::storage::{DefinitionStorage, ExecutionStorage, InMemoryStorage};
use chain_daemon::{
    BroadcastOutbox, ChainRuntime, ChainService, CreateChainDefinition, RuntimeParts,
    TriggerEvent,
};
use chain_engine::{handler_fn, ActionError, ActionHandler, ActionRequest, ActionRouter};
use chain_types::{
    ActionDescriptor, ChainDefinition, ChainDefinitionStep, ChainEvent, ChainExecution,
    ChainExecutionId, CompensationStatus, ExecutionStatus, FailureCause, FamilyId,
    NewChainDefinition, Registry, StepStatus, TriggerDescriptor, TriggerEventId, UserId,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ── Fixtures ─────────────────────────────────────────────────────────

fn registry() -> Registry {
    let mut builder = Registry::builder();
    builder
        .add_trigger(TriggerDescriptor::new("chore.completed", "chores"))
        .unwrap()
        .add_action(ActionDescriptor::new("tasks.create", 1, "tasks").compensated_by("tasks.delete"))
        .unwrap()
        .add_action(ActionDescriptor::new("tasks.delete", 1, "tasks"))
        .unwrap()
        .add_action(ActionDescriptor::new("points.award", 1, "rewards"))
        .unwrap()
        .add_action(ActionDescriptor::new("notify.send", 1, "notify"))
        .unwrap();
    builder.build()
}

/// Blocks until its invocation is cancelled
struct HangingHandler;

#[async_trait]
impl ActionHandler for HangingHandler {
    async fn handle(
        &self,
        _request: ActionRequest,
        cancel: CancellationToken,
    ) -> Result<Value, ActionError> {
        cancel.cancelled().await;
        Err(ActionError::Cancelled)
    }
}

type Calls = Arc<Mutex<Vec<String>>>;

fn recording(calls: &Calls, output: Value) -> impl ActionHandler + 'static {
    let calls = calls.clone();
    handler_fn(move |request: ActionRequest| {
        let calls = calls.clone();
        let output = output.clone();
        async move {
            calls.lock().unwrap().push(format!(
                "{}{}",
                request.action_type,
                if request.is_compensation { ":undo" } else { "" }
            ));
            Ok(output)
        }
    })
}

fn router(calls: &Calls) -> ActionRouter {
    let failing_calls = calls.clone();
    ActionRouter::new()
        .with_handler("tasks.create", 1, recording(calls, json!({ "task_id": "t-1" })))
        .with_handler("tasks.delete", 1, recording(calls, json!({})))
        .with_handler(
            "points.award",
            1,
            handler_fn(move |_request: ActionRequest| {
                let calls = failing_calls.clone();
                async move {
                    calls.lock().unwrap().push("points.award".to_string());
                    Err(ActionError::failed("ledger unavailable"))
                }
            }),
        )
        .with_handler("notify.send", 1, HangingHandler)
}

fn config(recovery: RecoveryMode) -> ChainDaemonConfig {
    let mut config = ChainDaemonConfig::default();
    config.dispatch.workers = 2;
    config.dispatch.sweep_interval_secs = 3600;
    config.dispatch.recovery = recovery;
    config.orchestrator.step_timeout_secs = 10;
    config
}

struct Harness {
    runtime: ChainRuntime,
    storage: Arc<InMemoryStorage>,
    calls: Calls,
    events: broadcast::Receiver<ChainEvent>,
}

impl Harness {
    async fn start(storage: Arc<InMemoryStorage>, recovery: RecoveryMode) -> Self {
        let calls: Calls = Arc::default();
        let outbox = BroadcastOutbox::new(256);
        let events = outbox.subscribe();
        let runtime = ChainRuntime::start(
            RuntimeParts {
                registry: Arc::new(registry()),
                storage: storage.clone(),
                executor: Arc::new(router(&calls)),
                outbox: Arc::new(outbox),
            },
            &config(recovery),
        )
        .await
        .unwrap();
        Self {
            runtime,
            storage,
            calls,
            events,
        }
    }

    fn service(&self) -> &ChainService {
        self.runtime.service()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait_terminal(&self, id: ChainExecutionId) -> ChainExecution {
        self.wait_until(id, |e| e.is_terminal()).await
    }

    async fn wait_until(
        &self,
        id: ChainExecutionId,
        done: impl Fn(&ChainExecution) -> bool,
    ) -> ChainExecution {
        for _ in 0..250 {
            if let Some(execution) = self.storage.get_execution(&id).await.unwrap() {
                if done(&execution) {
                    return execution;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("execution {} did not reach the expected state", id);
    }

    async fn next_event(&mut self, name: &str) -> ChainEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .unwrap()
                .unwrap();
            if event.name() == name {
                return event;
            }
        }
    }
}

fn create(steps: Vec<ChainDefinitionStep>) -> CreateChainDefinition {
    CreateChainDefinition {
        name: "chore reward".to_string(),
        description: String::new(),
        created_by_user_id: UserId::generate(),
        trigger_event_type: "chore.completed".to_string(),
        is_enabled: true,
        steps,
    }
}

fn create_task_step() -> ChainDefinitionStep {
    ChainDefinitionStep::new("task", "tasks.create", 1, 1)
        .with_input("title", "trigger.chore")
        .compensatable()
}

// ── Forward runs ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_trigger_runs_chain_to_completion() {
    let mut h = Harness::start(Arc::new(InMemoryStorage::new()), RecoveryMode::Resume).await;
    let family = FamilyId::generate();
    h.service()
        .create_definition(
            family,
            create(vec![
                create_task_step(),
                ChainDefinitionStep::new("again", "tasks.create", 1, 2)
                    .with_input("parent", "task.task_id")
                    .with_condition("trigger.points > 5"),
            ]),
        )
        .await
        .unwrap();

    let started = h
        .service()
        .ingest_event(
            family,
            TriggerEvent {
                event_type: "chore.completed".to_string(),
                event_id: Some("evt-1".to_string()),
                payload: json!({ "chore": "dishes", "points": 10 }),
            },
        )
        .await
        .unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].status, ExecutionStatus::Pending);
    assert_eq!(started[0].trigger_event_id, TriggerEventId::new("evt-1"));

    let done = h.wait_terminal(started[0].id).await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert!(done
        .step_executions
        .iter()
        .all(|s| s.status == StepStatus::Succeeded));
    assert_eq!(
        done.step_executions[1].inputs.as_ref().unwrap()["parent"],
        json!("t-1")
    );
    assert_eq!(h.calls(), vec!["tasks.create", "tasks.create"]);

    h.next_event("execution_completed").await;
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_false_condition_skips_step() {
    let h = Harness::start(Arc::new(InMemoryStorage::new()), RecoveryMode::Resume).await;
    let family = FamilyId::generate();
    let definition = h
        .service()
        .create_definition(
            family,
            create(vec![create_task_step().with_condition("trigger.points > 5")]),
        )
        .await
        .unwrap();

    let execution = h
        .service()
        .execute_definition(family, definition.id, json!({ "chore": "bins", "points": 1 }))
        .await
        .unwrap();

    let done = h.wait_terminal(execution.id).await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.step_executions[0].status, StepStatus::Skipped);
    assert!(h.calls().is_empty());
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_failed_step_compensates_prior_steps() {
    let mut h = Harness::start(Arc::new(InMemoryStorage::new()), RecoveryMode::Resume).await;
    let family = FamilyId::generate();
    let definition = h
        .service()
        .create_definition(
            family,
            create(vec![
                create_task_step(),
                ChainDefinitionStep::new("points", "points.award", 1, 2),
            ]),
        )
        .await
        .unwrap();

    let execution = h
        .service()
        .execute_definition(family, definition.id, json!({ "chore": "dishes" }))
        .await
        .unwrap();

    let done = h.wait_terminal(execution.id).await;
    assert_eq!(done.status, ExecutionStatus::Failed);
    let failure = done.failure.unwrap();
    assert_eq!(
        failure.cause,
        FailureCause::StepFailed {
            alias: "points".to_string()
        }
    );
    assert_eq!(done.compensation, Some(CompensationStatus::Compensated));
    assert_eq!(done.step_executions[0].status, StepStatus::Compensated);
    assert_eq!(done.step_executions[1].status, StepStatus::Failed);
    assert_eq!(
        h.calls(),
        vec!["tasks.create", "points.award", "tasks.delete:undo"]
    );

    h.next_event("execution_failed").await;
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_disabled_definition_fails_without_actions() {
    let h = Harness::start(Arc::new(InMemoryStorage::new()), RecoveryMode::Resume).await;
    let family = FamilyId::generate();
    let definition = h
        .service()
        .create_definition(family, create(vec![create_task_step()]))
        .await
        .unwrap();
    h.service()
        .disable_definition(family, definition.id)
        .await
        .unwrap();

    let execution = h
        .service()
        .execute_definition(family, definition.id, json!({}))
        .await
        .unwrap();

    let done = h.wait_terminal(execution.id).await;
    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.failure.unwrap().cause, FailureCause::ChainDisabled);
    assert!(h.calls().is_empty());
    h.runtime.shutdown().await;
}

// ── Cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_interrupts_running_action_and_compensates() {
    let h = Harness::start(Arc::new(InMemoryStorage::new()), RecoveryMode::Resume).await;
    let family = FamilyId::generate();
    let definition = h
        .service()
        .create_definition(
            family,
            create(vec![
                create_task_step(),
                ChainDefinitionStep::new("notify", "notify.send", 1, 2),
                ChainDefinitionStep::new("points", "points.award", 1, 3),
            ]),
        )
        .await
        .unwrap();

    let execution = h
        .service()
        .execute_definition(family, definition.id, json!({ "chore": "dishes" }))
        .await
        .unwrap();
    h.wait_until(execution.id, |e| {
        e.step_executions[1].status == StepStatus::Running
    })
    .await;

    let requested = h
        .service()
        .cancel_execution(family, execution.id)
        .await
        .unwrap();
    assert!(!requested.is_terminal());

    let done = h.wait_terminal(execution.id).await;
    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.failure.unwrap().cause, FailureCause::Cancelled);
    assert_eq!(done.step_executions[0].status, StepStatus::Compensated);
    assert_eq!(done.step_executions[1].status, StepStatus::Cancelled);
    assert_eq!(done.step_executions[2].status, StepStatus::NotRun);
    assert!(!h.calls().contains(&"points.award".to_string()));

    let err = h
        .service()
        .cancel_execution(family, execution.id)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already"));
    h.runtime.shutdown().await;
}

// ── Recovery ─────────────────────────────────────────────────────────

/// Persist a definition and an execution a crashed worker left mid-step
async fn seed_interrupted(storage: &InMemoryStorage) -> ChainExecution {
    let registry = registry();
    let (mut definition, _) = ChainDefinition::create(
        &registry,
        NewChainDefinition {
            name: "chore reward".to_string(),
            description: String::new(),
            family_id: FamilyId::generate(),
            created_by_user_id: UserId::generate(),
            trigger_event_type: "chore.completed".to_string(),
            is_enabled: true,
        },
    )
    .unwrap();
    definition.add_step(&registry, create_task_step()).unwrap();
    storage.insert_definition(&mut definition).await.unwrap();

    let mut execution = ChainExecution::for_definition(
        &definition,
        TriggerEventId::new("evt-crash"),
        json!({ "chore": "laundry" }),
    )
    .unwrap();
    storage.insert_execution(&mut execution).await.unwrap();
    execution.mark_running().unwrap();
    execution.step_executions[0].mark_running().unwrap();
    storage.save_execution(&mut execution).await.unwrap();
    execution
}

#[tokio::test]
async fn test_startup_recovery_resumes_interrupted_execution() {
    let storage = Arc::new(InMemoryStorage::new());
    let seeded = seed_interrupted(&storage).await;

    let h = Harness::start(storage, RecoveryMode::Resume).await;
    assert_eq!(h.runtime.recovery().resumed, 1);

    let done = h.wait_terminal(seeded.id).await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(h.calls(), vec!["tasks.create"]);
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_startup_recovery_fails_interrupted_execution() {
    let storage = Arc::new(InMemoryStorage::new());
    let seeded = seed_interrupted(&storage).await;

    let h = Harness::start(storage, RecoveryMode::Fail).await;
    assert_eq!(h.runtime.recovery().abandoned, 1);

    let done = h.wait_terminal(seeded.id).await;
    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.failure.unwrap().cause, FailureCause::Interrupted);
    assert_eq!(done.step_executions[0].status, StepStatus::Failed);
    assert!(h.calls().is_empty());
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn test_deleted_definition_fails_queued_execution() {
    let storage = Arc::new(InMemoryStorage::new());
    let seeded = seed_interrupted(&storage).await;
    storage
        .delete_definition(&seeded.chain_definition_id)
        .await
        .unwrap();

    let h = Harness::start(storage, RecoveryMode::Resume).await;
    let done = h.wait_terminal(seeded.id).await;
    assert_eq!(done.status, ExecutionStatus::Failed);
    assert_eq!(done.failure.unwrap().cause, FailureCause::DefinitionMissing);
    assert!(h.calls().is_empty());
    h.runtime.shutdown().await;
}
