// Library interface for Memoflow
// The binary and integration tests build on these modules

pub mod cache;
pub mod coerce;
pub mod config;
pub mod config_discovery;
pub mod context;
pub mod description;
pub mod error;
pub mod hash;
pub mod job;
pub mod logging;
pub mod module;
pub mod runner;
pub mod schema;
pub mod storage;
pub mod task;
pub mod tasks;
pub mod value;
pub mod variable;

// Re-export commonly used types
pub use cache::{CacheManager, CachedOutputs};
pub use context::{Context, TaskOutputs};
pub use description::{JobDescription, TaskDescription};
pub use error::{Error, Result};
pub use hash::HashGenerator;
pub use job::Job;
pub use module::{TaskInstance, TaskModule, TaskRegistry};
pub use runner::JobRunner;
pub use schema::{FieldType, Schema};
pub use storage::{create_storage_manager, FilesystemStorage, HttpStorage, StorageManager};
pub use task::Task;
pub use value::{Record, Tensor, Value};
