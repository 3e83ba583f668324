/// Content-addressed cache of task outputs
///
/// Each Outputs field is stored as its own blob at
/// `[task, version, input_hash, field]`, tagged with the field's content hash.
/// Retrieval is all-or-nothing: a task with any field missing is a miss.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::hash::HashGenerator;
use crate::logging::{operations, status};
use crate::schema::Schema;
use crate::storage::{create_storage_manager, StorageManager};
use crate::value::{Record, Value};

pub struct CacheManager {
    storage: Arc<dyn StorageManager>,
    hasher: Arc<HashGenerator>,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn StorageManager>, hasher: Arc<HashGenerator>) -> Self {
        Self { storage, hasher }
    }

    /// Build a cache over the backend selected by `url`
    pub fn from_url(url: &str, hasher: Arc<HashGenerator>) -> Result<Self> {
        let storage = create_storage_manager(url, hasher.clone())?;
        Ok(Self::new(storage, hasher))
    }

    /// Look up cached outputs for one task invocation.
    ///
    /// Returns `None` on a clean miss, and also when only some of the declared
    /// fields are stored. Backend read failures count as "not stored".
    pub fn get_cache(
        &self,
        task: &str,
        version: &str,
        input_hash: &str,
        outputs: &Schema,
    ) -> Option<CachedOutputs> {
        let base_path = vec![task.to_string(), version.to_string(), input_hash.to_string()];

        let mut hash_tags = BTreeMap::new();
        for field in outputs.field_names() {
            let path = field_path(&base_path, field);
            match self.storage.get_hash(&path) {
                Ok(Some(tag)) => {
                    hash_tags.insert(field.to_string(), tag);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    operation = operations::CACHE_LOOKUP,
                    status = status::ERROR,
                    "Failed to read cache entry {}: {:#}",
                    path.join("/"),
                    e
                ),
            }
        }

        if hash_tags.is_empty() {
            debug!(
                operation = operations::CACHE_LOOKUP,
                status = status::MISS,
                task = task,
                hash = input_hash,
                "No cache found"
            );
            return None;
        }

        if hash_tags.len() < outputs.fields.len() {
            let missing: Vec<&str> = outputs
                .field_names()
                .filter(|f| !hash_tags.contains_key(*f))
                .collect();
            warn!(
                operation = operations::CACHE_LOOKUP,
                status = status::PARTIAL,
                task = task,
                hash = input_hash,
                "Some cache files are missing: {:?}",
                missing
            );
            return None;
        }

        Some(CachedOutputs {
            storage: self.storage.clone(),
            hasher: self.hasher.clone(),
            base_path,
            schema: outputs.clone(),
            hash_tags,
            memo: Mutex::new(BTreeMap::new()),
        })
    }

    /// Store every field of `outputs`. Failures are logged, never returned.
    pub fn upload_cache(&self, task: &str, version: &str, input_hash: &str, outputs: &Record) {
        let base_path = vec![task.to_string(), version.to_string(), input_hash.to_string()];

        for (name, value) in &outputs.fields {
            let path = field_path(&base_path, name);
            if let Err(e) = self.upload_field(task, &path, name, value) {
                warn!(
                    operation = operations::CACHE_UPLOAD,
                    status = status::ERROR,
                    "Failed to upload cache {}: {:#}. The error is ignored.",
                    path.join("/"),
                    e
                );
            }
        }
    }

    fn upload_field(
        &self,
        task: &str,
        path: &[String],
        name: &str,
        value: &Value,
    ) -> anyhow::Result<()> {
        let hash = self.hasher.calculate_hash(value, None)?;
        let contents = serde_json::to_vec(value)?;

        // The stored tag must survive a serialization round trip. A failure
        // here is reported, the entry is stored anyway.
        match self.reload_hash(&contents) {
            Ok(loaded_hash) if loaded_hash == hash => {}
            Ok(loaded_hash) => error!(
                operation = operations::CACHE_UPLOAD,
                status = status::ERROR,
                task = task,
                "The object {} has a different hash after serialization. Before: {}. After: {}",
                name,
                hash,
                loaded_hash
            ),
            Err(e) => error!(
                operation = operations::CACHE_UPLOAD,
                status = status::ERROR,
                task = task,
                "The object {} cannot be read back after serialization: {}",
                name,
                e
            ),
        }

        self.storage.put_contents(path, &contents, &hash)?;
        debug!(
            operation = operations::CACHE_UPLOAD,
            status = status::SUCCESS,
            size_bytes = contents.len(),
            "Uploaded {}",
            path.join("/")
        );
        Ok(())
    }

    fn reload_hash(&self, contents: &[u8]) -> Result<String> {
        let loaded: Value = serde_json::from_slice(contents)?;
        self.hasher.calculate_hash(&loaded, None)
    }
}

fn field_path(base_path: &[String], field: &str) -> Vec<String> {
    let mut path = base_path.to_vec();
    path.push(field.to_string());
    path
}

/// Result of peeking at a cached field without fetching it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    Materialized(Value),
    /// Known to the cache, not downloaded yet
    Pending,
}

/// Lazily materialised stand-in for a task's Outputs record
///
/// Holds the stored hash tag of every field. A field's blob is only
/// downloaded on first access, then checked against the declared type and
/// memoized.
pub struct CachedOutputs {
    storage: Arc<dyn StorageManager>,
    hasher: Arc<HashGenerator>,
    base_path: Vec<String>,
    schema: Schema,
    hash_tags: BTreeMap<String, String>,
    memo: Mutex<BTreeMap<String, Value>>,
}

impl CachedOutputs {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Stored hash tag of `field`
    pub fn get_hash(&self, field: &str) -> Result<&str> {
        self.hash_tags
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| Error::lookup(format!("Unexpected cached field: {}", field)))
    }

    pub fn peek(&self, field: &str) -> Result<FieldState> {
        if self.schema.get(field).is_none() {
            return Err(Error::lookup(format!("Unexpected cached field: {}", field)));
        }
        Ok(match self.memo().get(field) {
            Some(value) => FieldState::Materialized(value.clone()),
            None => FieldState::Pending,
        })
    }

    /// Value of `field`, downloading it on first access
    pub fn get(&self, field: &str) -> Result<Value> {
        let spec = self
            .schema
            .get(field)
            .ok_or_else(|| Error::lookup(format!("Unexpected cached field: {}", field)))?;

        if let Some(value) = self.memo().get(field) {
            return Ok(value.clone());
        }

        let path = field_path(&self.base_path, field);
        let contents = self
            .storage
            .get_contents(&path)
            .map_err(|e| Error::Storage(format!("{:#}", e)))?
            .ok_or_else(|| {
                Error::Storage(format!("Cached blob {} has disappeared", path.join("/")))
            })?;
        let value: Value = serde_json::from_slice(&contents)?;

        if !spec.ty.accepts(&value) {
            return Err(Error::shape(format!(
                "The downloaded cache for {} has invalid type: {}. Expected: {}",
                field,
                value.kind(),
                spec.ty
            )));
        }

        let current = self.hasher.calculate_hash(&value, None)?;
        let expected = self.get_hash(field)?;
        if current != expected {
            error!(
                operation = operations::CACHE_FETCH,
                status = status::ERROR,
                field = field,
                "Downloaded cache {} has wrong hash. Expected: {}. Actual: {}. Ignoring this error.",
                field,
                expected,
                current
            );
        }

        info!(
            operation = operations::CACHE_FETCH,
            status = status::SUCCESS,
            size_bytes = contents.len(),
            "Fetched cached {}",
            path.join("/")
        );
        self.memo().insert(field.to_string(), value.clone());
        Ok(value)
    }

    /// Download every field and build the full Outputs record
    pub fn materialize(&self) -> Result<Record> {
        let mut record = Record::new(&self.schema.name);
        for field in self.schema.field_names() {
            record.insert(field, self.get(field)?);
        }
        Ok(record)
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for CachedOutputs {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            hasher: self.hasher.clone(),
            base_path: self.base_path.clone(),
            schema: self.schema.clone(),
            hash_tags: self.hash_tags.clone(),
            memo: Mutex::new(self.memo().clone()),
        }
    }
}

impl fmt::Debug for CachedOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedOutputs")
            .field("path", &self.base_path.join("/"))
            .field("hash_tags", &self.hash_tags)
            .finish()
    }
}
