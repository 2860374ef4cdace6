//! Binding context: the values step expressions can read
//!
//! Roots are `trigger` (the triggering payload) and one entry per succeeded
//! step alias. Skipped and failed steps contribute nothing, so a reference to
//! them is unresolved.

use crate::error::MappingError;
use chain_expr::Scope;
use chain_types::{ChainExecution, StepExpressions, StepStatus, TRIGGER_ROOT};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindingContext {
    roots: Map<String, Value>,
}

impl BindingContext {
    pub fn new(trigger_payload: Value) -> Self {
        let mut roots = Map::new();
        roots.insert(TRIGGER_ROOT.to_string(), trigger_payload);
        Self { roots }
    }

    /// Rebuild the context of a partially processed execution
    pub fn rebuild(execution: &ChainExecution) -> Self {
        let mut context = Self::new(execution.trigger_payload.clone());
        for step in &execution.step_executions {
            if step.status == StepStatus::Succeeded {
                context.insert_output(&step.alias, step.output.clone().unwrap_or(Value::Null));
            }
        }
        context
    }

    pub fn insert_output(&mut self, alias: &str, output: Value) {
        self.roots.insert(alias.to_string(), output);
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.roots.contains_key(alias)
    }

    /// Evaluate the step condition; a step without one always runs
    pub fn should_run<S>(&self, step: &S) -> Result<bool, MappingError>
    where
        S: StepExpressions + ?Sized,
    {
        Ok(step
            .parsed_condition()?
            .map_or(true, |condition| condition.evaluate(self)))
    }

    /// Resolve every input mapping of a step
    pub fn resolve_inputs<S>(&self, step: &S) -> Result<Map<String, Value>, MappingError>
    where
        S: StepExpressions + ?Sized,
    {
        let mut inputs = Map::new();
        for (param, binding) in step.parsed_bindings()? {
            let value = binding
                .resolve(self)
                .map_err(|source| MappingError::Unresolved {
                    param: param.to_string(),
                    expression: binding.source().to_string(),
                    source,
                })?;
            inputs.insert(param.to_string(), value);
        }
        Ok(inputs)
    }
}

impl Scope for BindingContext {
    fn root(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }
}
