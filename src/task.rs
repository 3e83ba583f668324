/// Runtime task: description + loaded module + execution lifecycle
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::coerce;
use crate::context::Context;
use crate::description::TaskDescription;
use crate::error::{Error, Result};
use crate::logging::{operations, status};
use crate::module::{TaskModule, TaskRegistry};
use crate::schema::{FieldType, Schema};
use crate::value::{Record, Value};
use crate::variable::replace_variables;

pub struct Task {
    task_id: String,
    name: String,
    inputs: BTreeMap<String, Value>,
    config: BTreeMap<String, Value>,
    module: Option<Arc<dyn TaskModule>>,
}

impl Task {
    /// Build a task from raw mappings. `$` strings become variables here.
    pub fn new(
        task_id: impl Into<String>,
        name: Option<String>,
        inputs: BTreeMap<String, Value>,
        config: BTreeMap<String, Value>,
    ) -> Result<Self> {
        let task_id = task_id.into();
        if task_id.is_empty() || task_id.chars().any(char::is_uppercase) {
            return Err(Error::description(format!(
                "Task identifier must be non-empty lower-case: {:?}",
                task_id
            )));
        }

        Ok(Self {
            name: name.unwrap_or_else(|| task_id.clone()),
            inputs: replace_all(inputs)?,
            config: replace_all(config)?,
            task_id,
            module: None,
        })
    }

    pub fn from_description(description: &TaskDescription) -> Result<Self> {
        Self::new(
            description.task.clone(),
            description.name.clone(),
            description.raw_inputs(),
            description.raw_config(),
        )
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn inputs(&self) -> &BTreeMap<String, Value> {
        &self.inputs
    }

    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }

    pub fn module(&self) -> Option<&Arc<dyn TaskModule>> {
        self.module.as_ref()
    }

    /// Resolve the module, check its schemas and check the raw config decodes.
    pub fn load_module(&mut self, registry: &TaskRegistry) -> Result<()> {
        let module = registry.resolve(&self.task_id)?;
        Self::validate(&self.task_id, module.as_ref())?;

        let (config_schema, _, _) = schemas(&self.task_id, module.as_ref())?;
        coerce::load_record(&config_schema, &self.config)?;

        self.module = Some(module);
        Ok(())
    }

    /// Schema shape rules: Config/Inputs/Outputs are records, Inputs and
    /// Outputs are flat, every Outputs field has a usable default.
    pub fn validate(task_id: &str, module: &dyn TaskModule) -> Result<()> {
        let (_, inputs, outputs) = schemas(task_id, module)?;

        for (kind, schema) in [("Inputs", &inputs), ("Outputs", &outputs)] {
            if let Some(field) = schema.fields.iter().find(|f| is_nested_record(&f.ty)) {
                return Err(Error::module(
                    task_id,
                    format!("{}.{} must not be a nested record", kind, field.name),
                ));
            }
        }

        for field in &outputs.fields {
            match &field.default {
                None => {
                    return Err(Error::module(
                        task_id,
                        format!("Outputs.{} must have a default value", field.name),
                    ))
                }
                Some(default) if !field.ty.accepts(default) => {
                    return Err(Error::module(
                        task_id,
                        format!(
                            "Outputs.{} default {} is not a {}",
                            field.name, default, field.ty
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Run the task against `context` and register its outputs there.
    ///
    /// Errors carry this task's identifier and name.
    pub fn execute(&self, context: &mut Context, dry_run: bool) -> Result<()> {
        self.run(context, dry_run)
            .map_err(|e| e.in_task(&self.task_id, &self.name))
    }

    fn run(&self, context: &mut Context, dry_run: bool) -> Result<()> {
        let module = self
            .module
            .as_ref()
            .ok_or_else(|| Error::ModuleNotLoaded(self.name.clone()))?;
        let (config_schema, inputs_schema, outputs_schema) =
            schemas(&self.task_id, module.as_ref())?;

        let config = coerce::load_record(&config_schema, &self.config)?;
        let inputs = coerce::load_record(&inputs_schema, &self.inputs)?;

        if dry_run {
            let config = context.resolve_record(&config)?;
            let inputs = context.resolve_record(&inputs)?;
            let mut instance = module.instantiate(config)?;
            let outputs = self.check_outputs(instance.dry_run(&inputs)?, &outputs_schema)?;
            info!(
                operation = operations::DRY_RUN,
                status = status::SUCCESS,
                task = %self.task_id,
                name = %self.name,
                "Dry run"
            );
            context.add_outputs(&self.name, outputs);
            return Ok(());
        }

        // Hash over the unresolved config and inputs
        let input_hash = context.calculate_hash(&Value::List(vec![
            Value::Record(config.clone()),
            Value::Record(inputs.clone()),
        ]))?;

        if module.cache_enabled() {
            if let Some(cached) = context.get_cached_outputs(
                &self.task_id,
                module.version(),
                &input_hash,
                &outputs_schema,
            ) {
                info!(
                    operation = operations::CACHE_LOOKUP,
                    status = status::HIT,
                    task = %self.task_id,
                    name = %self.name,
                    hash = %input_hash,
                    "Found cached outputs, skipping"
                );
                context.add_outputs(&self.name, cached);
                return Ok(());
            }
        }

        let config = context.resolve_record(&config)?;
        let inputs = context.resolve_record(&inputs)?;

        let resolved_hash = context.calculate_hash(&Value::List(vec![
            Value::Record(config.clone()),
            Value::Record(inputs.clone()),
        ]))?;
        if resolved_hash != input_hash {
            error!(
                task = %self.task_id,
                name = %self.name,
                "Hash changed after resolving variables. Before: {}. After: {}",
                input_hash,
                resolved_hash
            );
        }

        info!(
            operation = operations::EXECUTE,
            task = %self.task_id,
            name = %self.name,
            hash = %input_hash,
            "Running task"
        );
        let mut instance = module.instantiate(config)?;
        let rng = context.reset_rng();
        let outputs = self.check_outputs(instance.execute(&inputs, rng)?, &outputs_schema)?;

        context.add_outputs(&self.name, outputs.clone());
        if module.cache_enabled() {
            context.add_cache_outputs(&self.task_id, module.version(), &input_hash, &outputs);
        }
        Ok(())
    }

    fn check_outputs(&self, outputs: Option<Record>, schema: &Schema) -> Result<Record> {
        match outputs {
            None => {
                warn!(
                    task = %self.task_id,
                    name = %self.name,
                    "Task returned no outputs. Using the default Outputs."
                );
                schema.skeleton()
            }
            Some(record) => {
                schema.check_record(&record)?;
                Ok(record)
            }
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (task: {})", self.name, self.task_id)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("task_id", &self.task_id)
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("config", &self.config)
            .field("loaded", &self.module.is_some())
            .finish()
    }
}

fn replace_all(raw: BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>> {
    raw.into_iter()
        .map(|(k, v)| replace_variables(v).map(|v| (k, v)))
        .collect()
}

fn schemas(task_id: &str, module: &dyn TaskModule) -> Result<(Schema, Schema, Schema)> {
    let record = |kind: &str, ty: FieldType| match ty {
        FieldType::Record(schema) => Ok(schema),
        other => Err(Error::module(
            task_id,
            format!("{} must be a record type, got {}", kind, other),
        )),
    };
    Ok((
        record("Config", module.config_type())?,
        record("Inputs", module.inputs_type())?,
        record("Outputs", module.outputs_type())?,
    ))
}

fn is_nested_record(ty: &FieldType) -> bool {
    match ty {
        FieldType::Record(_) => true,
        FieldType::Optional(inner) => is_nested_record(inner),
        FieldType::Union(members) => members.iter().any(is_nested_record),
        _ => false,
    }
}
