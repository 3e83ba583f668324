use rand::rngs::StdRng;

use crate::error::Result;
use crate::module::{TaskInstance, TaskModule};
use crate::schema::{FieldType, Schema};
use crate::value::{Record, Value};

/// Emits its configured value as-is
pub struct ConstantTask;

struct Constant {
    value: Value,
}

impl TaskModule for ConstantTask {
    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        "Emit the configured value. Useful as a pipeline parameter that later tasks reference."
    }

    fn config_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Config").field("value", FieldType::Any))
    }

    fn outputs_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Outputs").field_with_default("value", FieldType::Any, Value::Null))
    }

    fn instantiate(&self, config: Record) -> Result<Box<dyn TaskInstance>> {
        let value = config.get("value").cloned().unwrap_or(Value::Null);
        Ok(Box::new(Constant { value }))
    }
}

impl TaskInstance for Constant {
    fn execute(&mut self, _inputs: &Record, _rng: &mut StdRng) -> Result<Option<Record>> {
        Ok(Some(Record::new("Outputs").with("value", self.value.clone())))
    }
}
