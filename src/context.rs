/// Per-run state shared by the tasks of one job
///
/// A [`Context`] owns the environment map, the outputs registered by tasks that
/// already ran, an optional cache, and the seeded RNG handed to each task.
/// Cloning forks an independent run: env map, outputs and RNG are copied, the
/// cache backend is shared.
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheManager, CachedOutputs};
use crate::error::{Error, Result};
use crate::hash::HashGenerator;
use crate::schema::Schema;
use crate::value::{Record, Value};

/// Outputs registered under a task name
#[derive(Debug, Clone)]
pub enum TaskOutputs {
    /// Produced by running the task
    Computed(Record),
    /// Served from the cache, fetched on demand
    Cached(CachedOutputs),
}

impl TaskOutputs {
    pub fn field(&self, name: &str) -> Result<Value> {
        match self {
            TaskOutputs::Computed(record) => record.get(name).cloned().ok_or_else(|| {
                Error::lookup(format!(
                    "{} has no field '{}'",
                    record.type_name, name
                ))
            }),
            TaskOutputs::Cached(cached) => cached.get(name),
        }
    }

    /// Hash of one field. Cached outputs answer with the stored tag.
    pub fn field_hash(&self, name: &str, hasher: &HashGenerator, context: &Context) -> Result<String> {
        match self {
            TaskOutputs::Computed(_) => hasher.calculate_hash(&self.field(name)?, Some(context)),
            TaskOutputs::Cached(cached) => cached.get_hash(name).map(str::to_string),
        }
    }

    /// The full record, downloading every cached field if needed
    pub fn materialize(&self) -> Result<Record> {
        match self {
            TaskOutputs::Computed(record) => Ok(record.clone()),
            TaskOutputs::Cached(cached) => cached.materialize(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, TaskOutputs::Cached(_))
    }
}

impl From<Record> for TaskOutputs {
    fn from(record: Record) -> Self {
        TaskOutputs::Computed(record)
    }
}

impl From<CachedOutputs> for TaskOutputs {
    fn from(cached: CachedOutputs) -> Self {
        TaskOutputs::Cached(cached)
    }
}

#[derive(Clone)]
pub struct Context {
    envs: BTreeMap<String, String>,
    outputs: BTreeMap<String, TaskOutputs>,
    cache_manager: Option<Arc<CacheManager>>,
    hasher: Arc<HashGenerator>,
    seed: u64,
    rng: StdRng,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("envs", &self.envs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("cache", &self.cache_manager.is_some())
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl Context {
    pub const DEFAULT_SEED: u64 = 0;

    pub fn new(envs: BTreeMap<String, String>) -> Self {
        Self {
            envs,
            outputs: BTreeMap::new(),
            cache_manager: None,
            hasher: Arc::new(HashGenerator::new()),
            seed: Self::DEFAULT_SEED,
            rng: StdRng::seed_from_u64(Self::DEFAULT_SEED),
        }
    }

    pub fn with_cache_manager(mut self, cache_manager: Arc<CacheManager>) -> Self {
        self.cache_manager = Some(cache_manager);
        self
    }

    pub fn with_hash_generator(mut self, hasher: Arc<HashGenerator>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn has_cache(&self) -> bool {
        self.cache_manager.is_some()
    }

    pub fn hash_generator(&self) -> &Arc<HashGenerator> {
        &self.hasher
    }

    /// Hash `value`, resolving any variables through this context
    pub fn calculate_hash(&self, value: &Value) -> Result<String> {
        self.hasher.calculate_hash(value, Some(self))
    }

    /// Register a task's outputs so later tasks can reference them.
    /// An existing entry under `name` is overwritten.
    pub fn add_outputs(&mut self, name: &str, outputs: impl Into<TaskOutputs>) {
        if self.outputs.contains_key(name) {
            warn!("Duplicated task name: {}. The outputs are overwritten.", name);
        }
        self.outputs.insert(name.to_string(), outputs.into());
    }

    pub fn get_outputs(&self, name: &str) -> Result<&TaskOutputs> {
        self.outputs
            .get(name)
            .ok_or_else(|| Error::lookup(format!("Output {} is not found.", name)))
    }

    pub fn add_environment_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.envs.insert(name.into(), value.into());
    }

    pub fn get_environment_variable(&self, name: &str) -> Result<&str> {
        self.envs
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::lookup(format!("Environment variable {} is not found.", name)))
    }

    /// Replace every variable inside `value` with what it refers to
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Map(map) => Ok(Value::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve(v)?)))
                    .collect::<Result<_>>()?,
            )),
            Value::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|v| self.resolve(v))
                    .collect::<Result<_>>()?,
            )),
            Value::Record(record) => Ok(Value::Record(self.resolve_record(record)?)),
            Value::Variable(var) => var.resolve(self),
            other => Ok(other.clone()),
        }
    }

    pub fn resolve_record(&self, record: &Record) -> Result<Record> {
        let mut resolved = Record::new(&record.type_name);
        for (name, value) in &record.fields {
            resolved.insert(name, self.resolve(value)?);
        }
        Ok(resolved)
    }

    /// Cached outputs for one task invocation, if a cache is configured and hit
    pub fn get_cached_outputs(
        &self,
        task: &str,
        version: &str,
        input_hash: &str,
        outputs: &Schema,
    ) -> Option<CachedOutputs> {
        let cache_manager = self.cache_manager.as_ref()?;
        debug!(
            "Trying to get cache for task {} version {}. Hash: {}",
            task, version, input_hash
        );
        cache_manager.get_cache(task, version, input_hash, outputs)
    }

    /// Store a task's outputs in the cache, if one is configured
    pub fn add_cache_outputs(&self, task: &str, version: &str, input_hash: &str, outputs: &Record) {
        if let Some(cache_manager) = &self.cache_manager {
            debug!(
                "Uploading cache for task {} version {}. Hash: {}",
                task, version, input_hash
            );
            cache_manager.upload_cache(task, version, input_hash, outputs);
        }
    }

    /// Reseed the RNG and hand it out. Called right before each real task run.
    pub fn reset_rng(&mut self) -> &mut StdRng {
        self.rng = StdRng::seed_from_u64(self.seed);
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::storage::memory::MemoryStorage;
    use crate::variable::Variable;
    use rand::Rng;

    #[test]
    fn test_environment_variables() {
        let mut context = Context::new(BTreeMap::from([("A".to_string(), "1".to_string())]));
        assert_eq!(context.get_environment_variable("A").unwrap(), "1");
        assert!(matches!(
            context.get_environment_variable("B"),
            Err(Error::Lookup(_))
        ));

        context.add_environment_variable("B", "2");
        assert_eq!(context.get_environment_variable("B").unwrap(), "2");
    }

    #[test]
    fn test_outputs_overwrite() {
        let mut context = Context::default();
        context.add_outputs("t", Record::new("Outputs").with("v", 1i64));
        context.add_outputs("t", Record::new("Outputs").with("v", 2i64));
        assert_eq!(
            context.get_outputs("t").unwrap().field("v").unwrap(),
            Value::Int(2)
        );

        let err = context.get_outputs("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut context = Context::new(BTreeMap::from([("A".to_string(), "1".to_string())]));
        context.add_outputs("t", Record::new("Outputs").with("v", 1i64));

        let mut forked = context.clone();
        forked.add_environment_variable("A", "changed");
        forked.add_outputs("u", Record::new("Outputs"));
        context.add_outputs("t", Record::new("Outputs").with("v", 3i64));

        assert_eq!(context.get_environment_variable("A").unwrap(), "1");
        assert!(context.get_outputs("u").is_err());
        assert_eq!(
            forked.get_outputs("t").unwrap().field("v").unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_resolve_nested() {
        let mut context = Context::new(BTreeMap::from([("NAME".to_string(), "abc".to_string())]));
        context.add_outputs("first", Record::new("Outputs").with("value", 7i64));

        let raw = Value::Map(BTreeMap::from([
            (
                "items".to_string(),
                Value::List(vec![
                    Value::Variable(Variable::parse("$env.NAME").unwrap()),
                    Value::Int(1),
                ]),
            ),
            (
                "record".to_string(),
                Value::Record(Record::new("Nested").with(
                    "x",
                    Variable::parse("$output.first.value").unwrap(),
                )),
            ),
        ]));

        let resolved = context.resolve(&raw).unwrap();
        assert!(!resolved.contains_variables());
        let map = resolved.as_map().unwrap();
        assert_eq!(
            map["items"],
            Value::List(vec![Value::from("abc"), Value::Int(1)])
        );
        assert_eq!(
            map["record"].as_record().unwrap().get("x"),
            Some(&Value::Int(7))
        );
    }

    #[test]
    fn test_reset_rng_is_deterministic() {
        let mut context = Context::default().with_seed(42);
        let first: u64 = context.reset_rng().random();
        let _: u64 = context.reset_rng().random();
        let again: u64 = context.reset_rng().random();
        assert_eq!(first, again);

        let mut other = Context::default().with_seed(7);
        let different: u64 = other.reset_rng().random();
        assert_ne!(first, different);
    }

    #[test]
    fn test_cached_outputs_hash_uses_stored_tag() {
        let storage = Arc::new(MemoryStorage::new());
        let hasher = Arc::new(HashGenerator::new());
        let manager = Arc::new(CacheManager::new(storage.clone(), hasher.clone()));
        let schema = Schema::new("Outputs").field_with_default("value", FieldType::Int, 0i64);

        let mut context = Context::default()
            .with_cache_manager(manager)
            .with_hash_generator(hasher);
        assert!(context.get_cached_outputs("t", "1", "h", &schema).is_none());

        let outputs = Record::new("Outputs").with("value", 7i64);
        context.add_cache_outputs("t", "1", "h", &outputs);
        let cached = context.get_cached_outputs("t", "1", "h", &schema).unwrap();
        context.add_outputs("first", cached);

        let var = Value::Variable(Variable::parse("$output.first.value").unwrap());
        assert_eq!(
            context.calculate_hash(&var).unwrap(),
            context.calculate_hash(&Value::Int(7)).unwrap()
        );
        // Hashing did not need the blob
        assert_eq!(storage.downloads(), 0);

        assert_eq!(context.resolve(&var).unwrap(), Value::Int(7));
        assert_eq!(storage.downloads(), 1);
        assert!(context.get_outputs("first").unwrap().is_cached());
    }

    #[test]
    fn test_no_cache_manager() {
        let context = Context::default();
        let schema = Schema::new("Outputs").field_with_default("value", FieldType::Int, 0i64);
        context.add_cache_outputs("t", "1", "h", &Record::new("Outputs").with("value", 1i64));
        assert!(context.get_cached_outputs("t", "1", "h", &schema).is_none());
        assert!(!context.has_cache());
    }
}
