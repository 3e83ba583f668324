/// Schema-driven decoding of raw config/inputs mappings into typed records
///
/// Dispatches on [`FieldType`]: records recurse into sub-mappings, lists and
/// maps recurse per element, optionals unwrap, scalars are cast. Variables are
/// left in place, tagged with the type expected at their position.
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use crate::value::{Record, Tensor, Value};

/// Build an instance of `schema` from a raw mapping
pub fn load_record(schema: &Schema, raw: &BTreeMap<String, Value>) -> Result<Record> {
    load_record_at(schema, raw, &schema.name)
}

/// Cast an already-resolved value to `ty`
pub fn cast(ty: &FieldType, value: Value) -> Result<Value> {
    coerce(ty, value, "value")
}

fn load_record_at(schema: &Schema, raw: &BTreeMap<String, Value>, path: &str) -> Result<Record> {
    if let Some(redundant) = raw.keys().find(|k| schema.get(k).is_none()) {
        return Err(Error::description(format!(
            "Redundant field '{}' in {}",
            redundant, path
        )));
    }

    let mut record = Record::new(&schema.name);
    for spec in &schema.fields {
        let field_path = format!("{}.{}", path, spec.name);
        let value = match raw.get(&spec.name) {
            Some(value) => coerce(&spec.ty, value.clone(), &field_path)?,
            None => match &spec.default {
                Some(default) => default.clone(),
                None if is_nullable(&spec.ty) => Value::Null,
                None => {
                    return Err(Error::description(format!(
                        "Missing required field {}",
                        field_path
                    )))
                }
            },
        };
        record.insert(&spec.name, value);
    }

    Ok(record)
}

fn is_nullable(ty: &FieldType) -> bool {
    match ty {
        FieldType::Optional(_) | FieldType::Null | FieldType::Any => true,
        FieldType::Union(members) => members.contains(&FieldType::Null),
        _ => false,
    }
}

/// `Union[T, None]` is the only accepted union shape
fn optional_member<'a>(members: &'a [FieldType], path: &str) -> Result<&'a FieldType> {
    let non_null: Vec<&FieldType> = members.iter().filter(|m| **m != FieldType::Null).collect();
    if members.len() == 2 && non_null.len() == 1 {
        Ok(non_null[0])
    } else {
        let shown = FieldType::Union(members.to_vec());
        Err(Error::description(format!(
            "Unsupported config type {} at {}: only Optional unions are allowed",
            shown, path
        )))
    }
}

fn coerce(ty: &FieldType, value: Value, path: &str) -> Result<Value> {
    let value = match value {
        Value::Variable(mut var) => {
            var.set_expected_type(leaf_type(ty, path)?);
            return Ok(Value::Variable(var));
        }
        other => other,
    };

    match ty {
        FieldType::Any => Ok(value),
        FieldType::Optional(inner) => match value {
            Value::Null => Ok(Value::Null),
            other => coerce(inner, other, path),
        },
        FieldType::Union(members) => {
            let inner = optional_member(members, path)?;
            match value {
                Value::Null => Ok(Value::Null),
                other => coerce(inner, other, path),
            }
        }
        FieldType::Record(schema) => match value {
            Value::Map(map) => Ok(Value::Record(load_record_at(schema, &map, path)?)),
            Value::Record(record) => Ok(Value::Record(load_record_at(schema, &record.fields, path)?)),
            other => Err(mismatch(ty, &other, path)),
        },
        FieldType::List(inner) => match value {
            Value::List(items) => Ok(Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| coerce(inner, item, &format!("{}[{}]", path, i)))
                    .collect::<Result<_>>()?,
            )),
            other => Err(mismatch(ty, &other, path)),
        },
        FieldType::Map(inner) => match value {
            Value::Map(map) => Ok(Value::Map(
                map.into_iter()
                    .map(|(k, v)| {
                        let item_path = format!("{}[{:?}]", path, k);
                        coerce(inner, v, &item_path).map(|v| (k, v))
                    })
                    .collect::<Result<_>>()?,
            )),
            other => Err(mismatch(ty, &other, path)),
        },
        scalar => cast_scalar(scalar, value, path),
    }
}

/// Type a variable is tagged with: optional wrappers are stripped
fn leaf_type(ty: &FieldType, path: &str) -> Result<FieldType> {
    match ty {
        FieldType::Optional(inner) => leaf_type(inner, path),
        FieldType::Union(members) => leaf_type(optional_member(members, path)?, path),
        other => Ok(other.clone()),
    }
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive
fn in_i64_range(f: f64) -> bool {
    f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn cast_scalar(ty: &FieldType, value: Value, path: &str) -> Result<Value> {
    let cast = match (ty, &value) {
        (FieldType::Null, Value::Null) => Some(Value::Null),

        (FieldType::Int, Value::Int(i)) => Some(Value::Int(*i)),
        (FieldType::Int, Value::Float(f)) if in_i64_range(*f) => Some(Value::Int(f.trunc() as i64)),
        (FieldType::Int, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
        (FieldType::Int, Value::Str(s)) => s.trim().parse::<i64>().ok().map(Value::Int),

        (FieldType::Float, Value::Float(f)) => Some(Value::Float(*f)),
        (FieldType::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
        (FieldType::Float, Value::Bool(b)) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
        (FieldType::Float, Value::Str(s)) => s.trim().parse::<f64>().ok().map(Value::Float),

        (FieldType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (FieldType::Bool, Value::Int(i)) => Some(Value::Bool(*i != 0)),
        (FieldType::Bool, Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },

        (FieldType::Str, Value::Str(s)) => Some(Value::Str(s.clone())),
        (FieldType::Str, Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            Some(Value::Str(value.to_string()))
        }

        (FieldType::Bytes, Value::Bytes(b)) => Some(Value::Bytes(b.clone())),
        (FieldType::Bytes, Value::Str(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),

        (FieldType::Tensor, Value::Tensor(t)) => Some(Value::Tensor(t.clone())),
        (FieldType::Tensor, Value::List(items)) => items
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
            .and_then(|values| Tensor::from_f64(vec![values.len()], &values).ok())
            .map(Value::Tensor),

        _ => None,
    };

    cast.ok_or_else(|| mismatch(ty, &value, path))
}

fn mismatch(ty: &FieldType, value: &Value, path: &str) -> Error {
    Error::description(format!(
        "Cannot convert {} value {} to {} at {}",
        value.kind(),
        value,
        ty,
        path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Variable;

    fn raw(json: serde_json::Value) -> BTreeMap<String, Value> {
        match crate::variable::replace_variables(Value::from_json(json)).unwrap() {
            Value::Map(map) => map,
            other => panic!("expected a map, got {other:?}"),
        }
    }

    fn config_schema() -> Schema {
        Schema::new("Config")
            .field("a", FieldType::Int)
            .field("b", FieldType::optional(FieldType::Int))
            .field("c", FieldType::list(FieldType::Int))
            .field(
                "nested",
                FieldType::Record(Schema::new("ChildConfig").field("x", FieldType::Int)),
            )
    }

    #[test]
    fn test_coerces_scalars_and_nested_records() {
        let record = load_record(
            &config_schema(),
            &raw(serde_json::json!({"a": "5", "b": null, "c": [1, 2, 3], "nested": {"x": "9"}})),
        )
        .unwrap();

        assert_eq!(record.get("a"), Some(&Value::Int(5)));
        assert_eq!(record.get("b"), Some(&Value::Null));
        assert_eq!(
            record.get("c"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
        let nested = record.get("nested").and_then(Value::as_record).unwrap();
        assert_eq!(nested.type_name, "ChildConfig");
        assert_eq!(nested.get("x"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_omitted_optional_becomes_null() {
        let record = load_record(
            &config_schema(),
            &raw(serde_json::json!({"a": 1, "c": [], "nested": {"x": 2}})),
        )
        .unwrap();
        assert_eq!(record.get("b"), Some(&Value::Null));
    }

    #[test]
    fn test_redundant_field_is_rejected() {
        let err = load_record(
            &config_schema(),
            &raw(serde_json::json!({"a": 1, "c": [], "nested": {"x": 2}, "unknown": 3})),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Description(_)));
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = load_record(&config_schema(), &raw(serde_json::json!({"a": 1}))).unwrap_err();
        assert!(err.to_string().contains("Config.c"));
    }

    #[test]
    fn test_defaults_and_maps() {
        let schema = Schema::new("Config")
            .field("str_dict_var", FieldType::map(FieldType::Str))
            .field_with_default("int_default_var", FieldType::Int, 42i64);
        let record = load_record(
            &schema,
            &raw(serde_json::json!({"str_dict_var": {"k": "v", "k2": 3}})),
        )
        .unwrap();
        assert_eq!(record.get("int_default_var"), Some(&Value::Int(42)));
        let map = record.get("str_dict_var").and_then(Value::as_map).unwrap();
        assert_eq!(map["k2"], Value::from("3"));
    }

    #[test]
    fn test_union_shapes() {
        let optional_union = Schema::new("Config").field(
            "v",
            FieldType::Union(vec![FieldType::Int, FieldType::Null]),
        );
        let record = load_record(&optional_union, &raw(serde_json::json!({"v": "7"}))).unwrap();
        assert_eq!(record.get("v"), Some(&Value::Int(7)));

        let wide_union = Schema::new("Config").field(
            "v",
            FieldType::Union(vec![FieldType::Int, FieldType::Str]),
        );
        let err = load_record(&wide_union, &raw(serde_json::json!({"v": 1}))).unwrap_err();
        assert!(err.to_string().contains("Unsupported config type"));
    }

    #[test]
    fn test_variables_are_tagged_not_resolved() {
        let schema = Schema::new("Inputs")
            .field("count", FieldType::optional(FieldType::Int))
            .field("items", FieldType::list(FieldType::Float));
        let record = load_record(
            &schema,
            &raw(serde_json::json!({"count": "$env.COUNT", "items": [1, "$env.ITEM"]})),
        )
        .unwrap();

        match record.get("count") {
            Some(Value::Variable(Variable::Environment(v))) => {
                assert_eq!(v.expected_type(), &FieldType::Int)
            }
            other => panic!("unexpected value: {other:?}"),
        }
        match record.get("items").and_then(Value::as_list) {
            Some([Value::Float(f), Value::Variable(Variable::Environment(v))]) => {
                assert_eq!(*f, 1.0);
                assert_eq!(v.expected_type(), &FieldType::Float);
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_cast_errors_name_the_field() {
        let schema = Schema::new("Config").field("a", FieldType::Int);
        let err = load_record(&schema, &raw(serde_json::json!({"a": "five"}))).unwrap_err();
        assert!(err.to_string().contains("Config.a"));
    }

    #[test]
    fn test_list_becomes_tensor() {
        let value = cast(&FieldType::Tensor, Value::List(vec![Value::Int(1), Value::Float(2.5)])).unwrap();
        match value {
            Value::Tensor(t) => assert_eq!(t.to_f64_vec(), vec![1.0, 2.5]),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_float_to_int_must_fit() {
        assert_eq!(cast(&FieldType::Int, Value::Float(-3.7)).unwrap(), Value::Int(-3));
        assert_eq!(
            cast(&FieldType::Int, Value::Float(-9.223372036854775808e18)).unwrap(),
            Value::Int(i64::MIN)
        );
        for f in [1e30, -1e30, 9.223372036854775808e18, f64::INFINITY, f64::NAN] {
            assert!(cast(&FieldType::Int, Value::Float(f)).is_err(), "{f} was accepted");
        }
    }
}
