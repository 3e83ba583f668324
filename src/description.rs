/// Serialized job descriptions
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::value::Value;

/// One task entry of a job file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDescription {
    /// Module identifier, lower-case
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
}

impl TaskDescription {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            name: None,
            inputs: None,
            config: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Raw inputs as dynamic values
    pub fn raw_inputs(&self) -> BTreeMap<String, Value> {
        to_values(self.inputs.as_ref())
    }

    /// Raw config as dynamic values
    pub fn raw_config(&self) -> BTreeMap<String, Value> {
        to_values(self.config.as_ref())
    }
}

fn to_values(map: Option<&BTreeMap<String, serde_json::Value>>) -> BTreeMap<String, Value> {
    map.map(|m| {
        m.iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v.clone())))
            .collect()
    })
    .unwrap_or_default()
}

/// Ordered list of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDescription {
    pub tasks: Vec<TaskDescription>,
}

impl JobDescription {
    pub fn new(tasks: Vec<TaskDescription>) -> Self {
        Self { tasks }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON job file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::description(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }
}
