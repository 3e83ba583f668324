/// Deterministic content hashing for task config, inputs and outputs
///
/// Containers are hashed recursively: each child is hashed first, then the
/// list of child digests (or the key-sorted map of key to child digest) is
/// serialized and hashed again. This keeps mapping order out of the hash and
/// lets a variable that points at a cached output contribute the cache's
/// stored tag without downloading the artifact.
///
/// Leaves go through a per-kind encoder registry. Tensors and raw bytes have
/// canonical encoders registered by default; everything else falls back to the
/// `serde_json` encoding of the value.
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};

/// Canonical byte encoding for one kind of leaf value
pub trait CanonicalEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;
}

/// dtype, shape and the raw little-endian element buffer
pub struct TensorEncoder;

impl CanonicalEncoder for TensorEncoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match value {
            Value::Tensor(tensor) => {
                let mut bytes = Vec::with_capacity(tensor.data.len() + 32);
                bytes.extend_from_slice(tensor.dtype.to_string().as_bytes());
                bytes.push(b':');
                for dim in &tensor.shape {
                    bytes.extend_from_slice(&(*dim as u64).to_le_bytes());
                }
                bytes.push(b':');
                bytes.extend_from_slice(&tensor.data);
                Ok(bytes)
            }
            other => Err(Error::execution(format!(
                "TensorEncoder cannot encode a {} value",
                other.kind()
            ))),
        }
    }
}

/// Raw bytes, untouched
pub struct BytesEncoder;

impl CanonicalEncoder for BytesEncoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match value {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            other => Err(Error::execution(format!(
                "BytesEncoder cannot encode a {} value",
                other.kind()
            ))),
        }
    }
}

/// Computes hex-encoded SHA-256 content hashes for [`Value`] trees
#[derive(Clone)]
pub struct HashGenerator {
    encoders: HashMap<ValueKind, Arc<dyn CanonicalEncoder>>,
}

impl Default for HashGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl HashGenerator {
    pub fn new() -> Self {
        let mut generator = Self {
            encoders: HashMap::new(),
        };
        generator.register(ValueKind::Tensor, Arc::new(TensorEncoder));
        generator.register(ValueKind::Bytes, Arc::new(BytesEncoder));
        generator
    }

    /// Route leaves of `kind` through `encoder` instead of the serde fallback.
    ///
    /// Containers and variables are always handled structurally.
    pub fn register(&mut self, kind: ValueKind, encoder: Arc<dyn CanonicalEncoder>) {
        self.encoders.insert(kind, encoder);
    }

    /// Hash `value`. Variables are resolved through `context`; hashing a
    /// variable without a context is a lookup error.
    pub fn calculate_hash(&self, value: &Value, context: Option<&Context>) -> Result<String> {
        match value {
            Value::List(items) => {
                let children = items
                    .iter()
                    .map(|item| self.calculate_hash(item, context))
                    .collect::<Result<Vec<_>>>()?;
                Ok(digest(&serde_json::to_vec(&children)?))
            }
            Value::Map(map) => self.hash_entries(map.iter(), context),
            Value::Record(record) => self.hash_entries(record.fields.iter(), context),
            Value::Variable(var) => {
                let context = context.ok_or_else(|| {
                    Error::lookup(format!("Cannot hash variable {} without a context", var))
                })?;
                var.get_hash(context, self)
            }
            leaf => match self.encoders.get(&leaf.kind()) {
                Some(encoder) => Ok(digest(&encoder.encode(leaf)?)),
                None => Ok(digest(&serde_json::to_vec(leaf)?)),
            },
        }
    }

    fn hash_entries<'a>(
        &self,
        entries: impl Iterator<Item = (&'a String, &'a Value)>,
        context: Option<&Context>,
    ) -> Result<String> {
        // BTreeMap keeps the keys sorted
        let children = entries
            .map(|(k, v)| Ok((k.as_str(), self.calculate_hash(v, context)?)))
            .collect::<Result<BTreeMap<&str, String>>>()?;
        Ok(digest(&serde_json::to_vec(&children)?))
    }
}

/// Hex-encoded SHA-256 of `bytes`
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Record, Tensor};
    use crate::variable::Variable;

    fn hash(value: &Value) -> String {
        HashGenerator::new().calculate_hash(value, None).unwrap()
    }

    fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_objects_without_variable() {
        for value in [
            Value::from("abcde"),
            Value::Int(123456),
            Value::Float(123.456),
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::List(vec![]),
            Value::List(vec![
                Value::List(vec![Value::Int(1), Value::Int(2)]),
                Value::List(vec![]),
            ]),
            map(&[("a", map(&[("aa", Value::Int(3))]))]),
            Value::Record(
                Record::new("Dummy")
                    .with("int_value", 3i64)
                    .with("float_value", 3.4)
                    .with("str_value", "345"),
            ),
        ] {
            let h = hash(&value);
            assert_eq!(h.len(), 64);
            assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_stable() {
        assert_eq!(hash(&Value::Int(1)), hash(&Value::Int(1)));
        assert_eq!(hash(&Value::Bool(true)), hash(&Value::Bool(true)));
        assert_eq!(hash(&Value::from("12345")), hash(&Value::from("12345")));
        assert_ne!(hash(&Value::Int(1)), hash(&Value::from("1")));
    }

    #[test]
    fn test_non_finite_floats_are_distinct() {
        let inf = hash(&Value::Float(f64::INFINITY));
        let ninf = hash(&Value::Float(f64::NEG_INFINITY));
        let nan = hash(&Value::Float(f64::NAN));

        assert_ne!(inf, ninf);
        assert_ne!(inf, nan);
        assert_ne!(ninf, nan);
        assert_ne!(nan, hash(&Value::Null));
        assert_ne!(inf, hash(&Value::from("inf")));
        assert_eq!(nan, hash(&Value::Float(-f64::NAN)));
    }

    #[test]
    fn test_mapping_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("a".to_string(), Value::Int(3));
        a.insert("b".to_string(), Value::Int(5));
        let mut b = BTreeMap::new();
        b.insert("b".to_string(), Value::Int(5));
        b.insert("a".to_string(), Value::Int(3));
        assert_eq!(hash(&Value::Map(a)), hash(&Value::Map(b)));
    }

    #[test]
    fn test_sequence_order_matters() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(2), Value::Int(1)]);
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_record_hashes_like_mapping_of_fields() {
        let record = Record::new("Outputs").with("x", 1i64).with("y", "z");
        let as_map = map(&[("y", Value::from("z")), ("x", Value::Int(1))]);
        assert_eq!(hash(&Value::Record(record)), hash(&as_map));
    }

    #[test]
    fn test_tensors() {
        let a = Tensor::from_f64(vec![3], &[1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_f64(vec![3], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(hash(&a.clone().into()), hash(&b.into()));

        let roundtrip: Value =
            serde_json::from_slice(&serde_json::to_vec(&Value::Tensor(a.clone())).unwrap()).unwrap();
        assert_eq!(hash(&roundtrip), hash(&a.clone().into()));

        let reshaped = Tensor::from_f64(vec![3, 1], &[1.0, 2.0, 3.0]).unwrap();
        assert_ne!(hash(&a.into()), hash(&reshaped.into()));

        let c = Tensor::from_i64(vec![2], &[2, 3]).unwrap();
        let d = Tensor::from_i64(vec![2], &[1, 2]).unwrap();
        assert_ne!(hash(&c.into()), hash(&d.into()));
    }

    #[test]
    fn test_tensor_inside_record() {
        let make = || {
            Value::Record(Record::new("Dummy").with(
                "t",
                Tensor::from_i64(vec![3], &[1, 2, 3]).unwrap(),
            ))
        };
        assert_eq!(hash(&make()), hash(&make()));
    }

    #[test]
    fn test_variables_hash_as_resolved_value() {
        let context = Context::new(BTreeMap::from([("V".to_string(), "12345".to_string())]));
        let generator = HashGenerator::new();
        let var = Value::Variable(Variable::parse("$env.V").unwrap());

        assert_eq!(
            generator.calculate_hash(&var, Some(&context)).unwrap(),
            hash(&Value::from("12345"))
        );
        assert_eq!(
            generator
                .calculate_hash(&Value::List(vec![var.clone(), Value::Int(67890)]), Some(&context))
                .unwrap(),
            hash(&Value::List(vec![Value::from("12345"), Value::Int(67890)]))
        );
    }

    #[test]
    fn test_variable_without_context_fails() {
        let var = Value::Variable(Variable::parse("$env.V").unwrap());
        assert!(HashGenerator::new().calculate_hash(&var, None).is_err());
    }

    struct CaseInsensitive;

    impl CanonicalEncoder for CaseInsensitive {
        fn encode(&self, value: &Value) -> Result<Vec<u8>> {
            Ok(value.as_str().unwrap_or_default().to_lowercase().into_bytes())
        }
    }

    #[test]
    fn test_registered_encoder_overrides_fallback() {
        let mut generator = HashGenerator::new();
        generator.register(ValueKind::Str, Arc::new(CaseInsensitive));
        assert_eq!(
            generator.calculate_hash(&Value::from("ABC"), None).unwrap(),
            generator.calculate_hash(&Value::from("abc"), None).unwrap()
        );
    }
}
