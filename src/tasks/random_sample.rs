use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Error, Result};
use crate::module::{TaskInstance, TaskModule};
use crate::schema::{FieldType, Schema};
use crate::value::{DType, Record, Tensor};

/// Uniform samples in `[low, high)` drawn from the task's seeded RNG
pub struct RandomSampleTask;

struct RandomSample {
    count: usize,
    low: f64,
    high: f64,
}

impl TaskModule for RandomSampleTask {
    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        "Draw uniformly distributed samples. The RNG is reseeded before every run, so the output is reproducible."
    }

    fn config_type(&self) -> FieldType {
        FieldType::Record(
            Schema::new("Config")
                .field_with_default("count", FieldType::Int, 1i64)
                .field_with_default("low", FieldType::Float, 0.0)
                .field_with_default("high", FieldType::Float, 1.0),
        )
    }

    fn outputs_type(&self) -> FieldType {
        FieldType::Record(Schema::new("Outputs").field_with_default(
            "samples",
            FieldType::Tensor,
            Tensor::zeros(DType::F64, vec![0]),
        ))
    }

    fn instantiate(&self, config: Record) -> Result<Box<dyn TaskInstance>> {
        let count = config.get("count").and_then(|v| v.as_i64()).unwrap_or(1);
        let low = config.get("low").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let high = config.get("high").and_then(|v| v.as_f64()).unwrap_or(1.0);

        let count = usize::try_from(count)
            .map_err(|_| Error::execution(format!("count must not be negative, got {}", count)))?;
        if low.partial_cmp(&high) != Some(std::cmp::Ordering::Less) {
            return Err(Error::execution(format!(
                "low ({}) must be less than high ({})",
                low, high
            )));
        }
        if !(low.is_finite() && high.is_finite() && (high - low).is_finite()) {
            return Err(Error::execution(format!(
                "[{}, {}) is not a finite sampling range",
                low, high
            )));
        }

        Ok(Box::new(RandomSample { count, low, high }))
    }
}

impl TaskInstance for RandomSample {
    fn execute(&mut self, _inputs: &Record, rng: &mut StdRng) -> Result<Option<Record>> {
        let samples: Vec<f64> = (0..self.count)
            .map(|_| rng.random_range(self.low..self.high))
            .collect();
        let tensor = Tensor::from_f64(vec![self.count], &samples)?;
        Ok(Some(Record::new("Outputs").with("samples", tensor)))
    }

    fn dry_run(&mut self, _inputs: &Record) -> Result<Option<Record>> {
        Ok(Some(Record::new("Outputs").with(
            "samples",
            Tensor::zeros(DType::F64, vec![self.count]),
        )))
    }
}
