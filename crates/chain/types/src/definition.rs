//! Chain definitions: authored blueprints of automated reactions
//!
//! A ChainDefinition binds a registry trigger to an ordered list of steps.
//! Each step invokes one registry action, with inputs bound from the trigger
//! payload or from earlier steps' outputs, and may be guarded by a condition.
//!
//! All validation happens here, at authoring time. A definition that made it
//! through `create` and `add_step` only references registered triggers and
//! actions and only carries expressions that parse.

use crate::{ChainDefinitionId, ChainError, ChainEvent, ChainResult, FamilyId, Registry, UserId};
use chain_expr::{Binding, Condition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context root reserved for the trigger payload
pub const TRIGGER_ROOT: &str = "trigger";

// ── Chain Definition ─────────────────────────────────────────────────

/// A named, ordered set of steps reacting to one trigger event type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub id: ChainDefinitionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub family_id: FamilyId,
    pub created_by_user_id: UserId,
    pub trigger_event_type: String,
    pub is_enabled: bool,
    /// Sorted by `step_order`, ties in insertion order
    pub steps: Vec<ChainDefinitionStep>,
    /// Optimistic concurrency counter, advanced by storage on every save
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scalar fields for a new definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewChainDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub family_id: FamilyId,
    pub created_by_user_id: UserId,
    pub trigger_event_type: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ChainDefinition {
    /// Create a definition with no steps
    ///
    /// Fails with `UnknownTrigger` when the registry does not know the event type.
    pub fn create(
        registry: &Registry,
        new: NewChainDefinition,
    ) -> ChainResult<(Self, ChainEvent)> {
        if new.name.trim().is_empty() {
            return Err(ChainError::EmptyName);
        }
        if !registry.is_valid_trigger(&new.trigger_event_type) {
            return Err(ChainError::UnknownTrigger(new.trigger_event_type));
        }

        let now = Utc::now();
        let definition = Self {
            id: ChainDefinitionId::generate(),
            name: new.name,
            description: new.description,
            family_id: new.family_id,
            created_by_user_id: new.created_by_user_id,
            trigger_event_type: new.trigger_event_type,
            is_enabled: new.is_enabled,
            steps: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let event = ChainEvent::DefinitionCreated {
            definition_id: definition.id,
            family_id: definition.family_id,
            trigger_event_type: definition.trigger_event_type.clone(),
            at: now,
        };
        Ok((definition, event))
    }

    /// Validate and insert a step, keeping the list sorted by `step_order`
    pub fn add_step(
        &mut self,
        registry: &Registry,
        mut step: ChainDefinitionStep,
    ) -> ChainResult<()> {
        if !is_valid_alias(&step.alias) {
            return Err(ChainError::InvalidAlias(step.alias));
        }
        if self.step(&step.alias).is_some() {
            return Err(ChainError::DuplicateAlias(step.alias));
        }

        let descriptor = registry
            .get_action(&step.action_type, step.action_version)
            .ok_or_else(|| ChainError::UnknownAction {
                action_type: step.action_type.clone(),
                version: step.action_version,
            })?;

        step.validate_expressions()?;

        if step.is_compensatable {
            if step.compensation_action_type.is_none() && descriptor.is_compensatable {
                step.compensation_action_type = descriptor.compensation_action_type.clone();
            }
            let compensation = step
                .compensation_action_type
                .as_deref()
                .ok_or_else(|| ChainError::MissingCompensationAction(step.alias.clone()))?;
            if !registry.is_valid_action(compensation, step.action_version) {
                return Err(ChainError::UnknownAction {
                    action_type: compensation.to_string(),
                    version: step.action_version,
                });
            }
        } else {
            step.compensation_action_type = None;
        }

        if step.name.is_empty() {
            step.name = step.alias.clone();
        }

        let position = self
            .steps
            .iter()
            .position(|existing| existing.step_order > step.step_order)
            .unwrap_or(self.steps.len());
        self.steps.insert(position, step);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Remove every step; used by full-replace updates
    pub fn clear_steps(&mut self) {
        self.steps.clear();
        self.updated_at = Utc::now();
    }

    /// Replace the scalar fields
    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        is_enabled: bool,
    ) -> ChainResult<ChainEvent> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ChainError::EmptyName);
        }
        self.name = name;
        self.description = description.into();
        self.is_enabled = is_enabled;
        self.updated_at = Utc::now();
        Ok(ChainEvent::DefinitionUpdated {
            definition_id: self.id,
            family_id: self.family_id,
            at: self.updated_at,
        })
    }

    pub fn enable(&mut self) -> ChainEvent {
        self.is_enabled = true;
        self.updated_at = Utc::now();
        ChainEvent::DefinitionEnabled {
            definition_id: self.id,
            family_id: self.family_id,
            at: self.updated_at,
        }
    }

    pub fn disable(&mut self) -> ChainEvent {
        self.is_enabled = false;
        self.updated_at = Utc::now();
        ChainEvent::DefinitionDisabled {
            definition_id: self.id,
            family_id: self.family_id,
            at: self.updated_at,
        }
    }

    /// Event recorded when the owning repository deletes this definition
    pub fn deleted_event(&self) -> ChainEvent {
        ChainEvent::DefinitionDeleted {
            definition_id: self.id,
            family_id: self.family_id,
            at: Utc::now(),
        }
    }

    /// Look up a step by alias
    pub fn step(&self, alias: &str) -> Option<&ChainDefinitionStep> {
        self.steps.iter().find(|s| s.alias == alias)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// A definition without steps is legal but does nothing when executed
    pub fn is_inert(&self) -> bool {
        self.steps.is_empty()
    }
}

// ── Chain Definition Step ────────────────────────────────────────────

/// One action invocation within a chain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinitionStep {
    /// Handle later steps use to reference this step's output
    pub alias: String,
    #[serde(default)]
    pub name: String,
    pub action_type: String,
    pub action_version: u32,
    /// Parameter name to binding expression
    #[serde(default)]
    pub input_mappings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub is_compensatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_action_type: Option<String>,
    pub step_order: i32,
}

impl ChainDefinitionStep {
    pub fn new(
        alias: impl Into<String>,
        action_type: impl Into<String>,
        action_version: u32,
        step_order: i32,
    ) -> Self {
        Self {
            alias: alias.into(),
            name: String::new(),
            action_type: action_type.into(),
            action_version,
            input_mappings: BTreeMap::new(),
            condition: None,
            is_compensatable: false,
            compensation_action_type: None,
            step_order,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input(mut self, param: impl Into<String>, expression: impl Into<String>) -> Self {
        self.input_mappings.insert(param.into(), expression.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Compensate with the action descriptor's default compensation action
    pub fn compensatable(mut self) -> Self {
        self.is_compensatable = true;
        self
    }

    pub fn compensated_by(mut self, action_type: impl Into<String>) -> Self {
        self.is_compensatable = true;
        self.compensation_action_type = Some(action_type.into());
        self
    }

    fn validate_expressions(&self) -> ChainResult<()> {
        self.parsed_condition()?;
        self.parsed_bindings()?;
        Ok(())
    }
}

impl StepExpressions for ChainDefinitionStep {
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

/// The condition and input mappings of a step
///
/// Implemented by the authored step and by the step execution that
/// snapshots it, so a run evaluates exactly what it was started with.
pub trait StepExpressions {
    fn alias(&self) -> &str;

    fn condition_source(&self) -> Option<&str>;

    /// Parameter name to binding expression
    fn input_mappings(&self) -> &BTreeMap<String, String>;

    /// Parse the condition, if any
    fn parsed_condition(&self) -> ChainResult<Option<Condition>> {
        self.condition_source()
            .map(|source| {
                Condition::parse(source).map_err(|source| ChainError::InvalidExpression {
                    alias: self.alias().to_string(),
                    field: "condition".to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Parse every input mapping, in parameter name order
    fn parsed_bindings(&self) -> ChainResult<Vec<(&str, Binding)>> {
        self.input_mappings()
            .iter()
            .map(|(param, source)| {
                Binding::parse(source)
                    .map(|binding| (param.as_str(), binding))
                    .map_err(|source| ChainError::InvalidExpression {
                        alias: self.alias().to_string(),
                        field: format!("input_mappings.{}", param),
                        source,
                    })
            })
            .collect()
    }
}

/// Aliases are context roots, so they must be plain identifiers
fn is_valid_alias(alias: &str) -> bool {
    let mut chars = alias.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(alias, TRIGGER_ROOT | "true" | "false" | "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionDescriptor, TriggerDescriptor};
    use chain_expr::ExprError;

    fn registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .add_trigger(TriggerDescriptor::new("chore.completed", "chores"))
            .unwrap();
        builder
            .add_action(
                ActionDescriptor::new("points.award", 1, "rewards").compensated_by("points.revoke"),
            )
            .unwrap();
        builder
            .add_action(ActionDescriptor::new("points.revoke", 1, "rewards"))
            .unwrap();
        builder
            .add_action(ActionDescriptor::new("notify.send", 1, "notifications"))
            .unwrap();
        builder
            .add_action(
                ActionDescriptor::new("calendar.book", 2, "calendar")
                    .compensated_by("calendar.cancel"),
            )
            .unwrap();
        builder.build()
    }

    fn new_definition(trigger: &str) -> NewChainDefinition {
        NewChainDefinition {
            name: "Reward chores".into(),
            description: "Award points when a chore is done".into(),
            family_id: FamilyId::generate(),
            created_by_user_id: UserId::generate(),
            trigger_event_type: trigger.into(),
            is_enabled: true,
        }
    }

    fn definition() -> ChainDefinition {
        ChainDefinition::create(&registry(), new_definition("chore.completed"))
            .unwrap()
            .0
    }

    #[test]
    fn test_create_emits_event() {
        let (definition, event) =
            ChainDefinition::create(&registry(), new_definition("chore.completed")).unwrap();
        assert!(definition.is_inert());
        assert_eq!(definition.version, 0);
        match event {
            ChainEvent::DefinitionCreated { definition_id, trigger_event_type, .. } => {
                assert_eq!(definition_id, definition.id);
                assert_eq!(trigger_event_type, "chore.completed");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_create_rejects_unknown_trigger() {
        let err =
            ChainDefinition::create(&registry(), new_definition("chore.vanished")).unwrap_err();
        assert_eq!(err, ChainError::UnknownTrigger("chore.vanished".into()));
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let mut new = new_definition("chore.completed");
        new.name = "  ".into();
        assert_eq!(
            ChainDefinition::create(&registry(), new).unwrap_err(),
            ChainError::EmptyName
        );
    }

    #[test]
    fn test_steps_sorted_stably() {
        let registry = registry();
        let mut definition = definition();
        definition
            .add_step(&registry, ChainDefinitionStep::new("c", "notify.send", 1, 3))
            .unwrap();
        definition
            .add_step(&registry, ChainDefinitionStep::new("a", "notify.send", 1, 1))
            .unwrap();
        definition
            .add_step(&registry, ChainDefinitionStep::new("b1", "notify.send", 1, 2))
            .unwrap();
        definition
            .add_step(&registry, ChainDefinitionStep::new("b2", "notify.send", 1, 2))
            .unwrap();

        let aliases: Vec<_> = definition.steps.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn test_add_step_rejects_duplicate_alias() {
        let registry = registry();
        let mut definition = definition();
        definition
            .add_step(&registry, ChainDefinitionStep::new("notify", "notify.send", 1, 1))
            .unwrap();
        let err = definition
            .add_step(&registry, ChainDefinitionStep::new("notify", "notify.send", 1, 2))
            .unwrap_err();
        assert_eq!(err, ChainError::DuplicateAlias("notify".into()));
        assert_eq!(definition.step_count(), 1);
    }

    #[test]
    fn test_add_step_rejects_unknown_action_version() {
        let err = definition()
            .add_step(&registry(), ChainDefinitionStep::new("notify", "notify.send", 2, 1))
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::UnknownAction {
                action_type: "notify.send".into(),
                version: 2
            }
        );
    }

    #[test]
    fn test_add_step_rejects_reserved_alias() {
        let err = definition()
            .add_step(&registry(), ChainDefinitionStep::new("trigger", "notify.send", 1, 1))
            .unwrap_err();
        assert_eq!(err, ChainError::InvalidAlias("trigger".into()));

        let err = definition()
            .add_step(&registry(), ChainDefinitionStep::new("send-mail", "notify.send", 1, 1))
            .unwrap_err();
        assert_eq!(err, ChainError::InvalidAlias("send-mail".into()));
    }

    #[test]
    fn test_add_step_rejects_bad_expressions() {
        let step = ChainDefinitionStep::new("notify", "notify.send", 1, 1)
            .with_input("message", "trigger.title ==");
        let err = definition().add_step(&registry(), step).unwrap_err();
        match err {
            ChainError::InvalidExpression { alias, field, source } => {
                assert_eq!(alias, "notify");
                assert_eq!(field, "input_mappings.message");
                assert!(matches!(source, ExprError::NotABinding { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let step = ChainDefinitionStep::new("notify", "notify.send", 1, 1)
            .with_condition("(trigger.points > 3");
        assert!(matches!(
            definition().add_step(&registry(), step),
            Err(ChainError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_add_step_rejects_oversized_condition() {
        let step = ChainDefinitionStep::new("notify", "notify.send", 1, 1)
            .with_condition(format!("{}true", "!".repeat(1_000_000)));
        match definition().add_step(&registry(), step).unwrap_err() {
            ChainError::InvalidExpression { field, source, .. } => {
                assert_eq!(field, "condition");
                assert!(matches!(source, ExprError::TooLong { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let step = ChainDefinitionStep::new("notify", "notify.send", 1, 1)
            .with_condition(format!("{}trigger.urgent", "(".repeat(200)));
        assert!(matches!(
            definition().add_step(&registry(), step),
            Err(ChainError::InvalidExpression {
                source: ExprError::TooDeep { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_compensation_action_defaults_from_descriptor() {
        let registry = registry();
        let mut definition = definition();
        definition
            .add_step(
                &registry,
                ChainDefinitionStep::new("award", "points.award", 1, 1).compensatable(),
            )
            .unwrap();
        assert_eq!(
            definition.step("award").unwrap().compensation_action_type.as_deref(),
            Some("points.revoke")
        );
    }

    #[test]
    fn test_compensation_action_must_exist() {
        let err = definition()
            .add_step(
                &registry(),
                ChainDefinitionStep::new("notify", "notify.send", 1, 1).compensatable(),
            )
            .unwrap_err();
        assert_eq!(err, ChainError::MissingCompensationAction("notify".into()));

        // calendar.cancel is declared but never registered
        let err = definition()
            .add_step(
                &registry(),
                ChainDefinitionStep::new("book", "calendar.book", 2, 1).compensatable(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::UnknownAction {
                action_type: "calendar.cancel".into(),
                version: 2
            }
        );
    }

    #[test]
    fn test_non_compensatable_step_drops_compensation_action() {
        let registry = registry();
        let mut definition = definition();
        let mut step = ChainDefinitionStep::new("award", "points.award", 1, 1);
        step.compensation_action_type = Some("points.revoke".into());
        definition.add_step(&registry, step).unwrap();
        assert!(definition.step("award").unwrap().compensation_action_type.is_none());
    }

    #[test]
    fn test_update_and_toggle() {
        let mut definition = definition();
        let event = definition.update("Renamed", "", false).unwrap();
        assert!(matches!(event, ChainEvent::DefinitionUpdated { .. }));
        assert_eq!(definition.name, "Renamed");
        assert!(!definition.is_enabled);

        assert!(matches!(definition.enable(), ChainEvent::DefinitionEnabled { .. }));
        assert!(definition.is_enabled);
        assert!(matches!(definition.disable(), ChainEvent::DefinitionDisabled { .. }));
        assert!(!definition.is_enabled);
    }

    #[test]
    fn test_clear_steps_allows_re_adding() {
        let registry = registry();
        let mut definition = definition();
        definition
            .add_step(&registry, ChainDefinitionStep::new("notify", "notify.send", 1, 1))
            .unwrap();
        definition.clear_steps();
        assert!(definition.is_inert());
        definition
            .add_step(&registry, ChainDefinitionStep::new("notify", "notify.send", 1, 1))
            .unwrap();
        assert_eq!(definition.step_count(), 1);
    }

    #[test]
    fn test_json_round_trip_preserves_steps() {
        let registry = registry();
        let mut definition = definition();
        definition
            .add_step(
                &registry,
                ChainDefinitionStep::new("award", "points.award", 1, 1)
                    .named("Award points")
                    .with_input("member_id", "trigger.member.id")
                    .with_input("points", "trigger.points")
                    .compensatable(),
            )
            .unwrap();
        definition
            .add_step(
                &registry,
                ChainDefinitionStep::new("notify", "notify.send", 1, 2)
                    .with_input("text", "'Well done!'")
                    .with_condition("award.total >= 100 && trigger.member.notify != false"),
            )
            .unwrap();

        let json = serde_json::to_string(&definition).unwrap();
        let restored: ChainDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, definition);
        assert_eq!(
            restored.step("notify").unwrap().condition.as_deref(),
            Some("award.total >= 100 && trigger.member.notify != false")
        );
    }
}
