//! Registry: the startup catalog of valid triggers and actions
//!
//! Every business module declares the trigger event types it emits and the
//! versioned actions it can execute. The registry is assembled once from
//! those declarations and is read-only afterwards; share it behind an `Arc`.
//!
//! Action lookup is an exact match on `(action_type, version)`. There is no
//! "latest version" fallback.

use crate::errors::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A trigger event type a module can emit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub event_type: String,
    pub owning_module: String,
    #[serde(default)]
    pub description: String,
    /// Shape of the payload carried by the event
    #[serde(default)]
    pub output_schema: Value,
}

impl TriggerDescriptor {
    pub fn new(event_type: impl Into<String>, owning_module: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            owning_module: owning_module.into(),
            description: String::new(),
            output_schema: Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// A versioned action a module can execute on behalf of a chain step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action_type: String,
    pub version: u32,
    pub owning_module: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_compensatable: bool,
    /// Default compensating action, invoked at the same version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_action_type: Option<String>,
    /// Shape of the action output
    #[serde(default)]
    pub output_schema: Value,
}

impl ActionDescriptor {
    pub fn new(
        action_type: impl Into<String>,
        version: u32,
        owning_module: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            version,
            owning_module: owning_module.into(),
            description: String::new(),
            is_compensatable: false,
            compensation_action_type: None,
            output_schema: Value::Null,
        }
    }

    /// Mark the action as undoable by `compensation_action_type`
    pub fn compensated_by(mut self, compensation_action_type: impl Into<String>) -> Self {
        self.is_compensatable = true;
        self.compensation_action_type = Some(compensation_action_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// A business module's self-declared contribution to the registry
pub trait ModuleCatalog {
    fn module_name(&self) -> &str;

    fn triggers(&self) -> Vec<TriggerDescriptor>;

    fn actions(&self) -> Vec<ActionDescriptor>;
}

/// Accumulates descriptors and rejects duplicates
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    triggers: HashMap<String, TriggerDescriptor>,
    actions: HashMap<String, BTreeMap<u32, ActionDescriptor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trigger(&mut self, trigger: TriggerDescriptor) -> RegistryResult<&mut Self> {
        if let Some(existing) = self.triggers.get(&trigger.event_type) {
            return Err(RegistryError::DuplicateTrigger {
                event_type: trigger.event_type,
                module: trigger.owning_module,
                existing: existing.owning_module.clone(),
            });
        }
        self.triggers.insert(trigger.event_type.clone(), trigger);
        Ok(self)
    }

    pub fn add_action(&mut self, action: ActionDescriptor) -> RegistryResult<&mut Self> {
        let versions = self.actions.entry(action.action_type.clone()).or_default();
        if let Some(existing) = versions.get(&action.version) {
            return Err(RegistryError::DuplicateAction {
                action_type: action.action_type,
                version: action.version,
                module: action.owning_module,
                existing: existing.owning_module.clone(),
            });
        }
        versions.insert(action.version, action);
        Ok(self)
    }

    /// Add everything a module declares
    pub fn add_module(&mut self, module: &dyn ModuleCatalog) -> RegistryResult<&mut Self> {
        for trigger in module.triggers() {
            self.add_trigger(trigger)?;
        }
        for action in module.actions() {
            self.add_action(action)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            triggers: self.triggers,
            actions: self.actions,
        }
    }
}

/// Immutable catalog of triggers and actions
#[derive(Debug, Default)]
pub struct Registry {
    triggers: HashMap<String, TriggerDescriptor>,
    actions: HashMap<String, BTreeMap<u32, ActionDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build the registry from every module's declarations
    pub fn from_modules(modules: &[&dyn ModuleCatalog]) -> RegistryResult<Self> {
        let mut builder = RegistryBuilder::new();
        for module in modules {
            builder.add_module(*module)?;
        }
        Ok(builder.build())
    }

    pub fn is_valid_trigger(&self, event_type: &str) -> bool {
        self.triggers.contains_key(event_type)
    }

    pub fn get_trigger(&self, event_type: &str) -> Option<&TriggerDescriptor> {
        self.triggers.get(event_type)
    }

    pub fn is_valid_action(&self, action_type: &str, version: u32) -> bool {
        self.get_action(action_type, version).is_some()
    }

    pub fn get_action(&self, action_type: &str, version: u32) -> Option<&ActionDescriptor> {
        self.actions.get(action_type)?.get(&version)
    }

    /// All triggers, sorted by event type
    pub fn triggers(&self) -> Vec<&TriggerDescriptor> {
        let mut triggers: Vec<_> = self.triggers.values().collect();
        triggers.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        triggers
    }

    /// All actions, sorted by type then version
    pub fn actions(&self) -> Vec<&ActionDescriptor> {
        let mut actions: Vec<_> = self.actions.values().flat_map(|v| v.values()).collect();
        actions.sort_by(|a, b| {
            a.action_type
                .cmp(&b.action_type)
                .then(a.version.cmp(&b.version))
        });
        actions
    }
}
