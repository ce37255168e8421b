//! Wire encoding of typed values.
//!
//! The host exchanges values as [`DynamicValue`]s: msgpack (preferred) or
//! JSON bytes that only make sense together with a [`Type`]. Unknown values
//! only exist in msgpack, as extension type 0 with a single zero byte.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::value::MapAccessDeserializer;
use serde::de::{
    self, Deserialize, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor,
};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::CodecError;
use crate::value::{exact_f64, normalize_number, Type, Value};

/// Extension type code used for unknown values.
const UNKNOWN_EXT_TYPE: i8 = 0;

/// A value as it travels over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicValue {
    /// msgpack encoding.
    pub msgpack: Vec<u8>,
    /// JSON encoding.
    pub json: Vec<u8>,
}

impl DynamicValue {
    /// Encode `value` as msgpack.
    pub fn encode(value: &Value) -> Result<Self, CodecError> {
        let msgpack = rmp_serde::to_vec(&WireValue(value))?;
        Ok(Self {
            msgpack,
            json: Vec::new(),
        })
    }

    /// Wrap JSON bytes.
    pub fn from_json(json: impl Into<Vec<u8>>) -> Self {
        Self {
            msgpack: Vec::new(),
            json: json.into(),
        }
    }

    /// Whether neither encoding carries data.
    pub fn is_empty(&self) -> bool {
        self.msgpack.is_empty() && self.json.is_empty()
    }

    /// Decode against `ty`, preferring msgpack over JSON.
    pub fn decode(&self, ty: &Type) -> Result<Value, CodecError> {
        if !self.msgpack.is_empty() {
            let mut de = rmp_serde::Deserializer::new(self.msgpack.as_slice());
            return Ok(ValueSeed(ty).deserialize(&mut de)?);
        }
        if !self.json.is_empty() {
            return decode_json(&self.json, ty);
        }
        Err(CodecError::Empty)
    }
}

/// Previously stored state as handed to a state upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawState {
    /// JSON encoding written by current hosts.
    pub json: Vec<u8>,
    /// Legacy flat key/value encoding.
    pub flatmap: BTreeMap<String, String>,
}

impl RawState {
    /// Raw state from JSON bytes.
    pub fn from_json(json: impl Into<Vec<u8>>) -> Self {
        Self {
            json: json.into(),
            flatmap: BTreeMap::new(),
        }
    }

    /// Decode the JSON state against `ty`. Legacy flatmap states are refused.
    pub fn decode(&self, ty: &Type) -> Result<Value, CodecError> {
        if !self.json.is_empty() {
            return decode_json(&self.json, ty);
        }
        if !self.flatmap.is_empty() {
            return Err(CodecError::Flatmap);
        }
        Err(CodecError::Empty)
    }
}

fn decode_json(bytes: &[u8], ty: &Type) -> Result<Value, CodecError> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = ValueSeed(ty).deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Serializes a [`Value`] in the host's wire shape.
struct WireValue<'a>(&'a Value);

impl Serialize for WireValue<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_null() {
            return s.serialize_unit();
        }
        if v.is_unknown() {
            return s.serialize_newtype_struct(
                rmp_serde::MSGPACK_EXT_STRUCT_NAME,
                &(UNKNOWN_EXT_TYPE, ExtPayload),
            );
        }
        if let Some(b) = v.as_bool() {
            return s.serialize_bool(b);
        }
        if let Some(n) = v.as_number() {
            if let Some(i) = n.as_i64() {
                return s.serialize_i64(i);
            }
            if let Some(u) = n.as_u64() {
                return s.serialize_u64(u);
            }
            // numbers a float cannot hold travel as decimal strings
            return match exact_f64(n) {
                Some(f) => s.serialize_f64(f),
                None => s.serialize_str(&n.to_string()),
            };
        }
        if let Some(st) = v.as_str() {
            return s.serialize_str(st);
        }
        if let Some(elems) = v.elements() {
            let mut seq = s.serialize_seq(Some(elems.len()))?;
            for e in elems {
                seq.serialize_element(&WireValue(e))?;
            }
            return seq.end();
        }
        if let Some(entries) = v.entries() {
            let mut map = s.serialize_map(Some(entries.len()))?;
            for (k, e) in entries {
                map.serialize_entry(k, &WireValue(e))?;
            }
            return map.end();
        }
        s.serialize_unit()
    }
}

struct ExtPayload;

impl Serialize for ExtPayload {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(&[0])
    }
}

/// Deserializes a wire value, using the expected type to interpret it.
pub(crate) struct ValueSeed<'a>(pub(crate) &'a Type);

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        d.deserialize_any(ValueVisitor(self.0))
    }
}

struct ValueVisitor<'a>(&'a Type);

impl ValueVisitor<'_> {
    fn mismatch<E: de::Error>(&self, got: &str) -> E {
        E::custom(format!("expected {}, got {}", self.0, got))
    }
}

impl<'de> Visitor<'de> for ValueVisitor<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a value of type {}", self.0)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::null(self.0.clone()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::null(self.0.clone()))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        ValueSeed(self.0).deserialize(d)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        d.deserialize_any(ExtVisitor)?;
        Ok(Value::unknown(self.0.clone()))
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        match self.0 {
            Type::Bool => Ok(Value::bool(b)),
            _ => Err(self.mismatch("bool")),
        }
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Value, E> {
        match self.0 {
            Type::Number => Ok(Value::int(i)),
            _ => Err(self.mismatch("number")),
        }
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
        match self.0 {
            Type::Number => Ok(Value::number(u.into())),
            _ => Err(self.mismatch("number")),
        }
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<Value, E> {
        match (self.0, serde_json::Number::from_f64(f)) {
            (Type::Number, Some(n)) => Ok(Value::number(normalize_number(n))),
            (Type::Number, None) => Err(E::custom("number is not finite")),
            _ => Err(self.mismatch("number")),
        }
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        match self.0 {
            Type::String => Ok(Value::string(s)),
            Type::Number => s
                .parse::<serde_json::Number>()
                .map(|n| Value::number(normalize_number(n)))
                .map_err(|_| E::custom(format!("{:?} is not a number", s))),
            Type::Bool => match s {
                "true" => Ok(Value::bool(true)),
                "false" => Ok(Value::bool(false)),
                _ => Err(self.mismatch("string")),
            },
            _ => Err(self.mismatch("string")),
        }
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        match self.0 {
            Type::List(elem) | Type::Set(elem) => {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(v) = seq.next_element_seed(ValueSeed(elem))? {
                    out.push(v);
                }
                Ok(match self.0 {
                    Type::Set(_) => Value::set((**elem).clone(), out),
                    _ => Value::list((**elem).clone(), out),
                })
            }
            Type::Tuple(types) => {
                let mut out = Vec::with_capacity(types.len());
                for t in types {
                    match seq.next_element_seed(ValueSeed(t))? {
                        Some(v) => out.push(v),
                        None => return Err(de::Error::invalid_length(out.len(), &self)),
                    }
                }
                if seq.next_element::<IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(types.len() + 1, &self));
                }
                Ok(Value::tuple(out))
            }
            _ => Err(self.mismatch("sequence")),
        }
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        match self.0 {
            // JSON numbers arrive as a single-entry map holding their exact text
            Type::Number => serde_json::Number::deserialize(MapAccessDeserializer::new(map))
                .map(|n| Value::number(normalize_number(n))),
            Type::Map(elem) => {
                let mut out = BTreeMap::new();
                while let Some(k) = map.next_key::<String>()? {
                    let v = map.next_value_seed(ValueSeed(elem))?;
                    out.insert(k, v);
                }
                Ok(Value::map((**elem).clone(), out))
            }
            Type::Object(attrs) => {
                let mut out = BTreeMap::new();
                while let Some(k) = map.next_key::<String>()? {
                    let Some(attr_ty) = attrs.get(&k) else {
                        return Err(de::Error::custom(format!("unsupported attribute {:?}", k)));
                    };
                    let v = map.next_value_seed(ValueSeed(attr_ty))?;
                    out.insert(k, v);
                }
                Value::object_of_type(self.0, out).map_err(de::Error::custom)
            }
            _ => Err(self.mismatch("map")),
        }
    }
}

/// Consumes the `(type, data)` pair of a msgpack extension.
struct ExtVisitor;

impl<'de> Visitor<'de> for ExtVisitor {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a msgpack extension")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let tag: i8 = seq
            .next_element()?
            .ok_or_else(|| de::Error::custom("missing extension type"))?;
        if tag != UNKNOWN_EXT_TYPE {
            return Err(de::Error::custom(format!("unsupported extension type {}", tag)));
        }
        seq.next_element::<IgnoredAny>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thing_type() -> Type {
        Type::object([
            ("id", Type::String),
            ("size", Type::Number),
            ("tags", Type::set(Type::String)),
            ("labels", Type::map(Type::String)),
            ("enabled", Type::Bool),
        ])
    }

    #[test]
    fn test_msgpack_preserves_unknowns() {
        let v = Value::object([
            ("id", Value::unknown(Type::String)),
            ("size", Value::int(3)),
            ("tags", Value::set(Type::String, vec![Value::string("a")])),
            ("labels", Value::null(Type::map(Type::String))),
            ("enabled", Value::unknown(Type::Bool)),
        ]);
        let dv = DynamicValue::encode(&v).unwrap();
        assert!(dv.json.is_empty());
        let back = dv.decode(&thing_type()).unwrap();
        assert_eq!(back, v);
        assert!(back.attribute("id").unwrap().is_unknown());
    }

    #[test]
    fn test_unknown_wire_bytes() {
        let dv = DynamicValue::encode(&Value::unknown(Type::String)).unwrap();
        // fixext1, type 0, one zero byte
        assert_eq!(dv.msgpack, vec![0xd4, 0x00, 0x00]);
    }

    #[test]
    fn test_null_wire_bytes() {
        let dv = DynamicValue::encode(&Value::null(thing_type())).unwrap();
        assert_eq!(dv.msgpack, vec![0xc0]);
        assert!(dv.decode(&thing_type()).unwrap().is_null());
    }

    #[test]
    fn test_json_decode_fills_missing_attributes() {
        let dv = DynamicValue::from_json(r#"{"id":"x","size":1.5}"#);
        let v = dv.decode(&thing_type()).unwrap();
        assert_eq!(v.attribute("id").unwrap().as_str(), Some("x"));
        assert_eq!(v.attribute("size").unwrap().as_f64(), Some(1.5));
        assert!(v.attribute("tags").unwrap().is_null());
    }

    #[test]
    fn test_decode_rejects_extra_attribute() {
        let dv = DynamicValue::from_json(r#"{"bogus":true}"#);
        assert!(dv.decode(&thing_type()).is_err());
    }

    #[test]
    fn test_decode_rejects_type_mismatch() {
        let dv = DynamicValue::from_json(r#"{"enabled":"yes"}"#);
        assert!(dv.decode(&thing_type()).is_err());
    }

    #[test]
    fn test_number_from_string() {
        let dv = DynamicValue::from_json(r#""42""#);
        assert_eq!(dv.decode(&Type::Number).unwrap(), Value::int(42));
    }

    #[test]
    fn test_numbers_keep_precision() {
        const BIG: &str = "123456789012345678901234567890";
        const FINE: &str = "0.1000000000000000000001";
        let text = |v: &Value, name: &str| {
            v.attribute(name)
                .and_then(Value::as_number)
                .map(|n| n.to_string())
        };

        let ty = Type::object([
            ("big", Type::Number),
            ("fine", Type::Number),
            ("whole", Type::Number),
        ]);
        let json = format!(r#"{{"big":{},"fine":{},"whole":2.000}}"#, BIG, FINE);
        let v = DynamicValue::from_json(json).decode(&ty).unwrap();
        assert_eq!(text(&v, "big").as_deref(), Some(BIG));
        assert_eq!(text(&v, "fine").as_deref(), Some(FINE));
        assert_eq!(v.attribute("whole").unwrap(), &Value::int(2));
        assert_ne!(v.attribute("fine").unwrap(), &Value::float(0.1));

        // msgpack carries inexact numbers as strings
        let back = DynamicValue::encode(&v).unwrap().decode(&ty).unwrap();
        assert_eq!(back, v);
        assert_eq!(text(&back, "big").as_deref(), Some(BIG));
    }

    #[test]
    fn test_empty_dynamic_value() {
        let err = DynamicValue::default().decode(&Type::String).unwrap_err();
        assert!(matches!(err, CodecError::Empty));
    }

    #[test]
    fn test_msgpack_preferred_over_json() {
        let mut dv = DynamicValue::encode(&Value::string("packed")).unwrap();
        dv.json = br#""json""#.to_vec();
        assert_eq!(dv.decode(&Type::String).unwrap(), Value::string("packed"));
    }

    #[test]
    fn test_raw_state() {
        let raw = RawState::from_json(r#"{"id":"abc"}"#);
        let v = raw.decode(&thing_type()).unwrap();
        assert_eq!(v.attribute("id").unwrap().as_str(), Some("abc"));

        let raw = RawState {
            json: Vec::new(),
            flatmap: BTreeMap::from([("id".to_string(), "abc".to_string())]),
        };
        assert!(matches!(raw.decode(&thing_type()), Err(CodecError::Flatmap)));
    }

    #[test]
    fn test_tuple_length_checked() {
        let ty = Type::Tuple(vec![Type::String, Type::Number]);
        let ok = DynamicValue::from_json(r#"["a", 1]"#).decode(&ty).unwrap();
        assert_eq!(ok, Value::tuple(vec![Value::string("a"), Value::int(1)]));
        assert!(DynamicValue::from_json(r#"["a"]"#).decode(&ty).is_err());
        assert!(DynamicValue::from_json(r#"["a", 1, 2]"#).decode(&ty).is_err());
    }
}
