//! Module catalog: business modules' self-declared triggers and actions
//!
//! Each configured module contributes descriptors to the registry, which is
//! built once at startup and never mutated afterwards. A module with an
//! `endpoint` also serves its actions over HTTP.

use chain_types::{ActionDescriptor, ModuleCatalog, Registry, RegistryResult, TriggerDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The `catalog` configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// One business module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// Base URL of the module's action endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerEntry>,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub event_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub output_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub action_type: String,
    pub version: u32,
    #[serde(default)]
    pub description: String,
    /// Compensating action; its presence makes the action compensatable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_action_type: Option<String>,
    #[serde(default)]
    pub output_schema: Value,
}

impl ModuleCatalog for ModuleConfig {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn triggers(&self) -> Vec<TriggerDescriptor> {
        self.triggers
            .iter()
            .map(|t| {
                TriggerDescriptor::new(&t.event_type, &self.name)
                    .with_description(&t.description)
                    .with_output_schema(t.output_schema.clone())
            })
            .collect()
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        self.actions
            .iter()
            .map(|a| {
                let descriptor = ActionDescriptor::new(&a.action_type, a.version, &self.name)
                    .with_description(&a.description)
                    .with_output_schema(a.output_schema.clone());
                match &a.compensation_action_type {
                    Some(compensation) => descriptor.compensated_by(compensation),
                    None => descriptor,
                }
            })
            .collect()
    }
}

impl CatalogConfig {
    /// Build the registry from every configured module
    pub fn build_registry(&self) -> RegistryResult<Registry> {
        let modules: Vec<&dyn ModuleCatalog> = self
            .modules
            .iter()
            .map(|m| m as &dyn ModuleCatalog)
            .collect();
        Registry::from_modules(&modules)
    }

    /// Module name to base URL, for modules that serve actions over HTTP
    pub fn endpoints(&self) -> HashMap<String, String> {
        self.modules
            .iter()
            .filter_map(|m| {
                m.endpoint
                    .as_ref()
                    .map(|endpoint| (m.name.clone(), endpoint.trim_end_matches('/').to_string()))
            })
            .collect()
    }
}
