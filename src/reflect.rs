//! Conversion between typed values and serde data.
//!
//! Provider code reads and writes plain Rust structs. These helpers route
//! them through `serde_json::Value`, using the schema type to rebuild a
//! typed [`Value`] on the way in.

use serde::de::{DeserializeOwned, DeserializeSeed};
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::codec::ValueSeed;
use crate::error::ValueError;
use crate::path::{Path, PathStep};
use crate::value::{Type, Value};

/// Build a typed value from JSON. `path` is only used in error messages.
pub fn value_from_json(ty: &Type, json: &Json, path: &Path) -> Result<Value, ValueError> {
    ValueSeed(ty).deserialize(json).map_err(|err| {
        if path.is_empty() {
            ValueError::Conversion(err.to_string())
        } else {
            ValueError::Conversion(format!("{}: {}", path, err))
        }
    })
}

/// Render a typed value as JSON. Unknown values cannot be represented.
pub fn value_to_json(value: &Value) -> Result<Json, ValueError> {
    to_json_at(value, &mut Path::empty())
}

fn to_json_at(value: &Value, path: &mut Path) -> Result<Json, ValueError> {
    if value.is_unknown() {
        return Err(ValueError::Unknown { path: path.clone() });
    }
    if value.is_null() {
        return Ok(Json::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Json::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(Json::Number(n.clone()));
    }
    if let Some(s) = value.as_str() {
        return Ok(Json::String(s.to_string()));
    }
    if let Some(elems) = value.elements() {
        let is_set = matches!(value.ty(), Type::Set(_));
        let mut out = Vec::with_capacity(elems.len());
        for (i, e) in elems.iter().enumerate() {
            path.push(if is_set {
                PathStep::ElementKeyValue(e.clone())
            } else {
                PathStep::ElementKeyInt(i as i64)
            });
            let res = to_json_at(e, path);
            path.pop();
            out.push(res?);
        }
        return Ok(Json::Array(out));
    }
    if let Some(entries) = value.entries() {
        let is_object = matches!(value.ty(), Type::Object(_));
        let mut out = Map::new();
        for (k, e) in entries {
            path.push(if is_object {
                PathStep::AttributeName(k.clone())
            } else {
                PathStep::ElementKeyString(k.clone())
            });
            let res = to_json_at(e, path);
            path.pop();
            out.insert(k.clone(), res?);
        }
        return Ok(Json::Object(out));
    }
    Ok(Json::Null)
}

/// Serialize `data` and rebuild it as a value of type `ty`.
pub fn from_serializable<T: Serialize + ?Sized>(
    ty: &Type,
    data: &T,
    path: &Path,
) -> Result<Value, ValueError> {
    let json = serde_json::to_value(data).map_err(|e| ValueError::Conversion(e.to_string()))?;
    value_from_json(ty, &json, path)
}

/// Deserialize a typed value into a caller type.
pub fn into_deserializable<T: DeserializeOwned>(value: &Value) -> Result<T, ValueError> {
    let json = value_to_json(value)?;
    serde_json::from_value(json).map_err(|e| ValueError::Conversion(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Server {
        name: String,
        port: Option<i64>,
        tags: Vec<String>,
    }

    fn server_type() -> Type {
        Type::object([
            ("name", Type::String),
            ("port", Type::Number),
            ("tags", Type::list(Type::String)),
        ])
    }

    #[test]
    fn test_struct_round_trip() {
        let s = Server {
            name: "web".to_string(),
            port: None,
            tags: vec!["a".to_string()],
        };
        let v = from_serializable(&server_type(), &s, &Path::empty()).unwrap();
        assert!(v.attribute("port").unwrap().is_null());
        let back: Server = into_deserializable(&v).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_unknown_cannot_be_deserialized() {
        let v = Value::object([
            ("name", Value::unknown(Type::String)),
            ("port", Value::int(1)),
            ("tags", Value::list(Type::String, vec![])),
        ]);
        let err = into_deserializable::<Server>(&v).unwrap_err();
        assert_eq!(err, ValueError::Unknown { path: Path::root("name") });
    }

    #[test]
    fn test_value_from_json_errors_name_the_path() {
        let err = value_from_json(&Type::Bool, &json!("nope"), &Path::root("enabled")).unwrap_err();
        assert!(err.to_string().starts_with("enabled: "));
    }

    #[test]
    fn test_value_to_json() {
        let v = Value::object([
            ("a", Value::set(Type::Number, vec![Value::int(1)])),
            ("b", Value::null(Type::String)),
        ]);
        assert_eq!(value_to_json(&v).unwrap(), json!({"a": [1], "b": null}));
    }
}
