/// Error taxonomy for the task execution engine
///
/// Cache consistency problems and cache I/O failures are not represented here:
/// they are logged and the run carries on.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed job description: bad variable syntax, redundant config field,
    /// unsupported type shape, value that cannot be cast.
    #[error("Invalid description: {0}")]
    Description(String),

    /// Task identifier not registered, or the module does not satisfy the
    /// schema shape rules.
    #[error("Invalid task module '{task}': {reason}")]
    Module { task: String, reason: String },

    #[error("load_module() must be called before executing task '{0}'")]
    ModuleNotLoaded(String),

    /// Unknown environment variable, unknown task output, missing output field.
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// A task produced (or the cache returned) a value that does not match
    /// the declared Outputs type.
    #[error("Unexpected outputs shape: {0}")]
    Shape(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid cache configuration: {0}")]
    Config(String),

    /// Raised by task implementations themselves.
    #[error("{0}")]
    Execution(String),

    #[error("Task {task} ({name}) failed: {source}")]
    Task {
        task: String,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn description(msg: impl Into<String>) -> Self {
        Self::Description(msg.into())
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn module(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Module {
            task: task.into(),
            reason: reason.into(),
        }
    }

    /// Attach the failing task's identifier and display name.
    pub fn in_task(self, task: &str, name: &str) -> Self {
        match self {
            already @ Self::Task { .. } => already,
            other => Self::Task {
                task: task.to_string(),
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }
}
