use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::module::{TaskInstance, TaskModule};
use crate::schema::{FieldType, Schema};
use crate::value::{Record, Value};

/// Total and count of a list of numbers or a tensor
pub struct SumTask;

struct Sum;

impl TaskModule for SumTask {
    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        "Sum a list of numbers or the elements of a tensor."
    }

    fn inputs_type(&self) -> FieldType {
        // List of numbers or a tensor, checked at run time
        FieldType::Record(Schema::new("Inputs").field("values", FieldType::Any))
    }

    fn outputs_type(&self) -> FieldType {
        FieldType::Record(
            Schema::new("Outputs")
                .field_with_default("total", FieldType::Float, 0.0)
                .field_with_default("count", FieldType::Int, 0i64),
        )
    }

    fn instantiate(&self, _config: Record) -> Result<Box<dyn TaskInstance>> {
        Ok(Box::new(Sum))
    }
}

impl TaskInstance for Sum {
    fn execute(&mut self, inputs: &Record, _rng: &mut StdRng) -> Result<Option<Record>> {
        let values = match inputs.get("values") {
            Some(Value::Tensor(tensor)) => tensor.to_f64_vec(),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| {
                    v.as_f64()
                        .ok_or_else(|| Error::execution(format!("Not a number: {}", v)))
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(Error::execution(format!(
                    "'values' must be a list or a tensor, got {:?}",
                    other.map(Value::kind)
                )))
            }
        };

        Ok(Some(
            Record::new("Outputs")
                .with("total", values.iter().sum::<f64>())
                .with("count", values.len() as i64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Tensor;
    use rand::SeedableRng;

    fn run(values: Value) -> Result<Option<Record>> {
        let mut task = SumTask.instantiate(Record::new("Config")).unwrap();
        task.execute(
            &Record::new("Inputs").with("values", values),
            &mut StdRng::seed_from_u64(0),
        )
    }

    #[test]
    fn test_sum_list() {
        let outputs = run(Value::List(vec![Value::Int(1), Value::Float(2.5)]))
            .unwrap()
            .unwrap();
        assert_eq!(outputs.get("total"), Some(&Value::Float(3.5)));
        assert_eq!(outputs.get("count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_sum_tensor() {
        let tensor = Tensor::from_f32(vec![2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let outputs = run(tensor.into()).unwrap().unwrap();
        assert_eq!(outputs.get("total"), Some(&Value::Float(10.0)));
        assert_eq!(outputs.get("count"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_sum_rejects_other_values() {
        assert!(run(Value::from("nope")).is_err());
    }
}
