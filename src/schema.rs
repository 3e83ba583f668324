/// Typed record schemas for task Config, Inputs and Outputs
///
/// Every field carries a [`FieldType`] descriptor. Decoding, shape checks and
/// validation all dispatch on that tag.
use std::fmt;

use crate::error::{Error, Result};
use crate::value::{Record, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// No casting or checking
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tensor,
    Optional(Box<FieldType>),
    /// Only `Union([T, Null])` is usable in config; anything else is rejected
    /// at decode time.
    Union(Vec<FieldType>),
    List(Box<FieldType>),
    /// String-keyed mapping
    Map(Box<FieldType>),
    Record(Schema),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn map(inner: FieldType) -> Self {
        FieldType::Map(Box::new(inner))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, FieldType::Record(_))
    }

    pub fn as_record(&self) -> Option<&Schema> {
        match self {
            FieldType::Record(schema) => Some(schema),
            _ => None,
        }
    }

    /// Whether `value` is an instance of this type.
    ///
    /// Ints are accepted where floats are expected.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Any, _) => true,
            (FieldType::Null, Value::Null) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Float, Value::Float(_) | Value::Int(_)) => true,
            (FieldType::Str, Value::Str(_)) => true,
            (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Tensor, Value::Tensor(_)) => true,
            (FieldType::Optional(_), Value::Null) => true,
            (FieldType::Optional(inner), v) => inner.accepts(v),
            (FieldType::Union(members), v) => members.iter().any(|m| m.accepts(v)),
            (FieldType::List(inner), Value::List(items)) => items.iter().all(|i| inner.accepts(i)),
            (FieldType::Map(inner), Value::Map(map)) => map.values().all(|v| inner.accepts(v)),
            (FieldType::Record(schema), Value::Record(record)) => {
                schema.check_record(record).is_ok()
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => f.write_str("Any"),
            FieldType::Null => f.write_str("None"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::Str => f.write_str("str"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::Tensor => f.write_str("Tensor"),
            FieldType::Optional(inner) => write!(f, "Optional[{}]", inner),
            FieldType::Union(members) => {
                f.write_str("Union[")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                f.write_str("]")
            }
            FieldType::List(inner) => write!(f, "List[{}]", inner),
            FieldType::Map(inner) => write!(f, "Dict[str, {}]", inner),
            FieldType::Record(schema) => f.write_str(&schema.name),
        }
    }
}

/// One named, typed field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub default: Option<Value>,
}

/// Named list of fields
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    /// Add a field with a default value
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            default: Some(default.into()),
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check that `record` is an instance of this schema: same type name,
    /// every declared field present and well-typed, nothing extra.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        if record.type_name != self.name {
            return Err(Error::shape(format!(
                "expected an instance of {}, got {}",
                self.name, record.type_name
            )));
        }

        for spec in &self.fields {
            match record.get(&spec.name) {
                None => {
                    return Err(Error::shape(format!(
                        "{} is missing field '{}'",
                        self.name, spec.name
                    )))
                }
                Some(value) if !spec.ty.accepts(value) => {
                    return Err(Error::shape(format!(
                        "{}.{} expects {}, got {}",
                        self.name,
                        spec.name,
                        spec.ty,
                        value.kind()
                    )))
                }
                Some(_) => {}
            }
        }

        if let Some(extra) = record.fields.keys().find(|k| self.get(k).is_none()) {
            return Err(Error::shape(format!(
                "{} has no field '{}'",
                self.name, extra
            )));
        }

        Ok(())
    }

    /// Instance built purely from field defaults
    pub fn skeleton(&self) -> Result<Record> {
        let mut record = Record::new(&self.name);
        for spec in &self.fields {
            let default = spec.default.clone().ok_or_else(|| {
                Error::shape(format!("{}.{} has no default value", self.name, spec.name))
            })?;
            record.insert(&spec.name, default);
        }
        Ok(record)
    }
}
