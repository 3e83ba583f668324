/// Dynamic values flowing through a pipeline
///
/// Config, inputs and outputs are all expressed as `Value` trees. Typed records
/// carry their schema name so shape checks can tell one record type from another.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::variable::Variable;

/// A dynamically typed value
///
/// The serde representation is the on-disk format of cached output fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Str(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Tensor(Tensor),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(Record),
    /// Unresolved reference, only present in config/inputs before resolution
    Variable(Variable),
}

/// Discriminant of a [`Value`], used to key per-kind hash encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    Tensor,
    List,
    Map,
    Record,
    Variable,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Tensor => "tensor",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Record => "record",
            ValueKind::Variable => "variable",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Tensor(_) => ValueKind::Tensor,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Record(_) => ValueKind::Record,
            Value::Variable(_) => ValueKind::Variable,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Ints widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// True if a [`Variable`] appears anywhere in this tree
    pub fn contains_variables(&self) -> bool {
        match self {
            Value::Variable(_) => true,
            Value::List(items) => items.iter().any(Value::contains_variables),
            Value::Map(map) => map.values().any(Value::contains_variables),
            Value::Record(record) => record.fields.values().any(Value::contains_variables),
            _ => false,
        }
    }

    /// Convert a JSON document (as found in job descriptions) into a `Value`.
    ///
    /// Integral numbers become `Int`, every other number becomes `Float`.
    /// Strings are kept verbatim; `$` placeholders are handled by
    /// [`crate::variable::replace_variables`].
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Tensor(t) => write!(f, "<tensor {} {:?}>", t.dtype, t.shape),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Record(record) => write!(f, "{}", record),
            Value::Variable(var) => f.write_str(var.as_str()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::Tensor(tensor)
    }
}

impl From<Variable> for Value {
    fn from(var: Variable) -> Self {
        Value::Variable(var)
    }
}

/// Instance of a typed record (Config, Inputs, Outputs or a nested config record)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.type_name)?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str(")")
    }
}

/// Element type of a [`Tensor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub fn item_size(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Dense numeric buffer
///
/// `data` holds the elements in row-major order as little-endian bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Vec<usize>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Tensor {
    /// Build a tensor from raw little-endian bytes, checking the length
    /// against `shape` and `dtype`.
    pub fn from_raw(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> crate::Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.item_size();
        if data.len() != expected {
            return Err(crate::Error::description(format!(
                "Tensor of shape {:?} and dtype {} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> crate::Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_raw(DType::F64, shape, data)
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> crate::Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_raw(DType::F32, shape, data)
    }

    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> crate::Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_raw(DType::I64, shape, data)
    }

    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Self {
        let len = shape.iter().product::<usize>() * dtype.item_size();
        Self {
            dtype,
            shape,
            data: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements widened to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let size = self.dtype.item_size();
        self.data
            .chunks_exact(size)
            .map(|chunk| match self.dtype {
                DType::U8 => chunk[0] as f64,
                DType::I32 => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
                DType::F32 => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
                DType::I64 => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(chunk);
                    i64::from_le_bytes(buf) as f64
                }
                DType::F64 => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(chunk);
                    f64::from_le_bytes(buf)
                }
            })
            .collect()
    }
}

/// Hex encoding for binary payloads inside JSON blobs
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// JSON has no infinities or NaN: those are written as strings
mod float_repr {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"inf\", \"-inf\" or \"nan\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_numbers() {
        let value = Value::from_json(serde_json::json!({"a": 3, "b": 2.5, "c": [1, "x", null]}));
        let map = value.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(3));
        assert_eq!(map["b"], Value::Float(2.5));
        assert_eq!(
            map["c"],
            Value::List(vec![Value::Int(1), Value::from("x"), Value::Null])
        );
    }

    #[test]
    fn test_blob_format_preserves_tensor_and_bytes() {
        let value = Value::List(vec![
            Value::Tensor(Tensor::from_f64(vec![2], &[1.5, -2.0]).unwrap()),
            Value::Bytes(vec![0, 255, 7]),
            Value::Record(Record::new("Outputs").with("n", 4i64)),
        ]);
        let encoded = serde_json::to_vec(&value).unwrap();
        let decoded: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn test_blob_format_keeps_non_finite_floats() {
        for x in [f64::INFINITY, f64::NEG_INFINITY, -0.0, 1e300] {
            let encoded = serde_json::to_vec(&Value::Float(x)).unwrap();
            let decoded: Value = serde_json::from_slice(&encoded).unwrap();
            assert_eq!(decoded, Value::Float(x));
        }

        let encoded = serde_json::to_string(&Value::Float(f64::NAN)).unwrap();
        assert_eq!(encoded, r#"{"float":"nan"}"#);
        match serde_json::from_str::<Value>(&encoded).unwrap() {
            Value::Float(x) => assert!(x.is_nan()),
            other => panic!("unexpected value: {other:?}"),
        }

        assert!(serde_json::from_str::<Value>(r#"{"float":"huge"}"#).is_err());
        assert!(serde_json::from_str::<Value>(r#"{"float":null}"#).is_err());
    }

    #[test]
    fn test_tensor_length_is_checked() {
        assert!(Tensor::from_raw(DType::F32, vec![2, 2], vec![0; 15]).is_err());
        let tensor = Tensor::from_raw(DType::F32, vec![2, 2], vec![0; 16]).unwrap();
        assert_eq!(tensor.len(), 4);
    }

    #[test]
    fn test_tensor_to_f64() {
        let tensor = Tensor::from_i64(vec![3], &[1, -2, 3]).unwrap();
        assert_eq!(tensor.to_f64_vec(), vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_display() {
        let record = Record::new("Outputs").with("value", 7i64).with("name", "x");
        assert_eq!(record.to_string(), "Outputs(name=\"x\", value=7)");
    }
}
