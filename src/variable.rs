/// Placeholders in task descriptions
///
/// Any string in a task's `config` or `inputs` that starts with `$` is a
/// variable. Two kinds exist:
///
/// - `$env.NAME` reads `NAME` from the run's environment map and casts it to the
///   type of the field it was bound to (string by default).
/// - `$output.task_name.field` reads `field` from the outputs of an earlier task.
///
/// Variables stay unresolved inside config/inputs until a [`Context`] resolves
/// them, so the task hash can be computed over the variable itself.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coerce;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::hash::HashGenerator;
use crate::schema::FieldType;
use crate::value::Value;

const ENV_PREFIX: &str = "$env";
const OUTPUT_PREFIX: &str = "$output";

/// Reference to a value that is only known at run time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Variable {
    Environment(EnvironmentVariable),
    Output(OutputVariable),
}

impl Variable {
    /// Parse a `$`-prefixed literal into the matching variable kind
    pub fn parse(literal: &str) -> Result<Self> {
        if literal.starts_with("$env.") {
            Ok(Variable::Environment(EnvironmentVariable::new(literal)?))
        } else if literal.starts_with("$output.") {
            Ok(Variable::Output(OutputVariable::new(literal)?))
        } else {
            Err(Error::description(format!(
                "Unknown variable type: {}",
                literal
            )))
        }
    }

    /// The literal as written in the description
    pub fn as_str(&self) -> &str {
        match self {
            Variable::Environment(v) => &v.literal,
            Variable::Output(v) => &v.literal,
        }
    }

    /// Bind the type the resolved value must be cast to.
    ///
    /// Only environment variables are cast; task outputs are already typed.
    pub fn set_expected_type(&mut self, expected: FieldType) {
        if let Variable::Environment(v) = self {
            v.expected_type = expected;
        }
    }

    pub fn resolve(&self, context: &Context) -> Result<Value> {
        match self {
            Variable::Environment(v) => v.resolve(context),
            Variable::Output(v) => v.resolve(context),
        }
    }

    /// Hash of the value this variable stands for.
    ///
    /// Output variables backed by a cache entry reuse the stored hash tag, so a
    /// cached artifact does not have to be downloaded just to be hashed.
    pub fn get_hash(&self, context: &Context, hasher: &HashGenerator) -> Result<String> {
        match self {
            Variable::Environment(v) => {
                let value = v.resolve(context)?;
                hasher.calculate_hash(&value, Some(context))
            }
            Variable::Output(v) => context
                .get_outputs(&v.task_name)?
                .field_hash(&v.field, hasher, context),
        }
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variable::Environment(a), Variable::Environment(b)) => a.literal == b.literal,
            (Variable::Output(a), Variable::Output(b)) => a.literal == b.literal,
            _ => false,
        }
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Variable {
    type Error = Error;

    fn try_from(literal: String) -> Result<Self> {
        Variable::parse(&literal)
    }
}

impl From<Variable> for String {
    fn from(var: Variable) -> Self {
        var.as_str().to_string()
    }
}

/// `$env.NAME`
#[derive(Debug, Clone)]
pub struct EnvironmentVariable {
    literal: String,
    name: String,
    expected_type: FieldType,
}

impl EnvironmentVariable {
    pub fn new(literal: &str) -> Result<Self> {
        let parts: Vec<&str> = literal.split('.').collect();
        if parts.len() != 2 || parts[0] != ENV_PREFIX || !is_upper_name(parts[1]) {
            return Err(Error::description(format!(
                "Invalid environment variable name: {}",
                literal
            )));
        }

        Ok(Self {
            literal: literal.to_string(),
            name: parts[1].to_string(),
            expected_type: FieldType::Str,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected_type(&self) -> &FieldType {
        &self.expected_type
    }

    pub fn resolve(&self, context: &Context) -> Result<Value> {
        let raw = context.get_environment_variable(&self.name)?;
        coerce::cast(&self.expected_type, Value::Str(raw.to_string())).map_err(|e| {
            Error::description(format!(
                "Environment variable {} cannot be cast to {}: {}",
                self.name, self.expected_type, e
            ))
        })
    }
}

/// `$output.task_name.field`
#[derive(Debug, Clone)]
pub struct OutputVariable {
    literal: String,
    task_name: String,
    field: String,
}

impl OutputVariable {
    pub fn new(literal: &str) -> Result<Self> {
        let parts: Vec<&str> = literal.split('.').collect();
        let valid = parts.len() == 3
            && parts[0] == OUTPUT_PREFIX
            && parts.iter().all(|p| !p.is_empty())
            && is_lower(literal);
        if !valid {
            return Err(Error::description(format!(
                "Invalid output variable name: {}",
                literal
            )));
        }

        Ok(Self {
            literal: literal.to_string(),
            task_name: parts[1].to_string(),
            field: parts[2].to_string(),
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn resolve(&self, context: &Context) -> Result<Value> {
        context.get_outputs(&self.task_name)?.field(&self.field)
    }
}

/// Upper-case with at least one letter; digits and underscores allowed
fn is_upper_name(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_lower(s: &str) -> bool {
    s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
}

/// Replace every `$`-prefixed string in a raw description tree with a [`Variable`]
pub fn replace_variables(value: Value) -> Result<Value> {
    match value {
        Value::Map(map) => Ok(Value::Map(
            map.into_iter()
                .map(|(k, v)| replace_variables(v).map(|v| (k, v)))
                .collect::<Result<_>>()?,
        )),
        Value::List(items) => Ok(Value::List(
            items
                .into_iter()
                .map(replace_variables)
                .collect::<Result<_>>()?,
        )),
        Value::Str(s) if s.starts_with('$') => Ok(Value::Variable(Variable::parse(&s)?)),
        other => Ok(other),
    }
}
