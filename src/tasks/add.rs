use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::module::{TaskInstance, TaskModule};
use crate::schema::{FieldType, Schema};
use crate::value::Record;

/// `result = (a + b) * scale`
pub struct AddTask;

struct Add {
    scale: f64,
}

impl TaskModule for AddTask {
    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        "Add two numbers and multiply the sum by a configured scale."
    }

    fn config_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Config").field_with_default("scale", FieldType::Float, 1.0))
    }

    fn inputs_type(&self) -> FieldType {
        FieldType::Record(
            Schema::new("Inputs")
                .field("a", FieldType::Float)
                .field("b", FieldType::Float),
        )
    }

    fn outputs_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Outputs").field_with_default("result", FieldType::Float, 0.0))
    }

    fn instantiate(&self, config: Record) -> Result<Box<dyn TaskInstance>> {
        let scale = config.get("scale").and_then(|v| v.as_f64()).unwrap_or(1.0);
        Ok(Box::new(Add { scale }))
    }
}

impl TaskInstance for Add {
    fn execute(&mut self, inputs: &Record, _rng: &mut StdRng) -> Result<Option<Record>> {
        let a = number(inputs, "a")?;
        let b = number(inputs, "b")?;
        Ok(Some(
            Record::new("Outputs").with("result", (a + b) * self.scale),
        ))
    }
}

fn number(inputs: &Record, field: &str) -> Result<f64> {
    inputs
        .get(field)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::execution(format!("Input '{}' must be a number", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use rand::SeedableRng;

    #[test]
    fn test_add() {
        let mut task = AddTask
            .instantiate(Record::new("Config").with("scale", 2.0))
            .unwrap();
        let inputs = Record::new("Inputs").with("a", 1i64).with("b", 2.5);
        let outputs = task
            .execute(&inputs, &mut StdRng::seed_from_u64(0))
            .unwrap()
            .unwrap();
        assert_eq!(outputs.get("result"), Some(&Value::Float(7.0)));
    }

    #[test]
    fn test_non_numeric_input() {
        let mut task = AddTask.instantiate(Record::new("Config")).unwrap();
        let inputs = Record::new("Inputs").with("a", "x").with("b", 1.0);
        assert!(task.execute(&inputs, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
