/// Task module capability set and the registry that resolves identifiers to it
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use crate::value::Record;

/// A configured task, ready to run
pub trait TaskInstance {
    /// Run the task. `Ok(None)` means "nothing to report" and is replaced by
    /// the default Outputs instance.
    fn execute(&mut self, inputs: &Record, rng: &mut StdRng) -> Result<Option<Record>>;

    /// Side-effect-free variant that only describes the outputs' shape
    fn dry_run(&mut self, _inputs: &Record) -> Result<Option<Record>> {
        Ok(None)
    }
}

/// Implementation behind a task identifier
///
/// Declares the Config, Inputs and Outputs types and builds a [`TaskInstance`]
/// from a decoded config.
pub trait TaskModule: Send + Sync {
    /// Part of the cache key: bump it when outputs change for identical inputs
    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn config_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Config"))
    }

    fn inputs_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Inputs"))
    }

    fn outputs_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Outputs"))
    }

    /// Side-effecting tasks opt out of caching
    fn cache_enabled(&self) -> bool {
        true
    }

    fn instantiate(&self, config: Record) -> Result<Box<dyn TaskInstance>>;
}

/// Identifier to module mapping
#[derive(Clone, Default)]
pub struct TaskRegistry {
    modules: BTreeMap<String, Arc<dyn TaskModule>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in task
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::tasks::register_builtin(&mut registry);
        registry
    }

    /// Register `module` under `identifier`, replacing any previous entry
    pub fn register(&mut self, identifier: impl Into<String>, module: Arc<dyn TaskModule>) {
        self.modules.insert(identifier.into(), module);
    }

    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn TaskModule>> {
        self.modules
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::module(identifier, "Task not found"))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.modules.contains_key(identifier)
    }

    /// Sorted identifiers
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
