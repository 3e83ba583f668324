use rand::rngs::StdRng;

use crate::error::Result;
use crate::module::{TaskInstance, TaskModule};
use crate::schema::{FieldType, Schema};
use crate::value::{Record, Value};

/// Writes its input to stdout. Never cached.
pub struct PrintTask;

struct Print {
    label: Option<String>,
}

impl TaskModule for PrintTask {
    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        "Print a value to stdout, optionally prefixed with a label."
    }

    fn config_type(&self) -> FieldType {
        FieldType::Record(
            Schema::new("Config").field("label", FieldType::optional(FieldType::Str)),
        )
    }

    fn inputs_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Inputs").field("value", FieldType::Any))
    }

    fn cache_enabled(&self) -> bool {
        false
    }

    fn instantiate(&self, config: Record) -> Result<Box<dyn TaskInstance>> {
        let label = config
            .get("label")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Box::new(Print { label }))
    }
}

impl Print {
    fn line(&self, value: &Value) -> String {
        let text = match value {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        };
        match &self.label {
            Some(label) => format!("{}: {}", label, text),
            None => text,
        }
    }
}

impl TaskInstance for Print {
    fn execute(&mut self, inputs: &Record, _rng: &mut StdRng) -> Result<Option<Record>> {
        let value = inputs.get("value").cloned().unwrap_or(Value::Null);
        println!("{}", self.line(&value));
        Ok(None)
    }
}
