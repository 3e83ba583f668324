//! Built-in task modules
//!
//! Small, general-purpose tasks so a job file can be written and cached
//! without any user-supplied modules.

pub mod add;
pub mod constant;
pub mod print;
pub mod random_sample;
pub mod sum;

use std::sync::Arc;

use crate::module::TaskRegistry;

pub fn register_builtin(registry: &mut TaskRegistry) {
    registry.register("add", Arc::new(add::AddTask));
    registry.register("constant", Arc::new(constant::ConstantTask));
    registry.register("print", Arc::new(print::PrintTask));
    registry.register("random_sample", Arc::new(random_sample::RandomSampleTask));
    registry.register("sum", Arc::new(sum::SumTask));
}
