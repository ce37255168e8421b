//! Wire-level types and typed values.
//!
//! A [`Value`] always carries its [`Type`], so null and unknown values stay
//! typed. Values are immutable trees; [`Value::transform`] rebuilds a tree
//! bottom-up and [`Value::set_at_path`] splices a sub-value in place.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeSeq, SerializeTuple};
use serde::{Serialize, Serializer};
use serde_json::Number;

use crate::error::ValueError;
use crate::path::{Path, PathStep};

/// A wire type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Boolean.
    Bool,
    /// Arbitrary precision number.
    Number,
    /// UTF-8 string.
    String,
    /// Ordered collection of one element type.
    List(Box<Type>),
    /// Unordered collection of unique elements of one type.
    Set(Box<Type>),
    /// String-keyed collection of one element type.
    Map(Box<Type>),
    /// Fixed set of named, individually typed attributes.
    Object(BTreeMap<String, Type>),
    /// Fixed-length sequence of individually typed elements.
    Tuple(Vec<Type>),
}

impl Type {
    /// Create a list type.
    pub fn list(element: Type) -> Self {
        Self::List(Box::new(element))
    }

    /// Create a set type.
    pub fn set(element: Type) -> Self {
        Self::Set(Box::new(element))
    }

    /// Create a map type.
    pub fn map(element: Type) -> Self {
        Self::Map(Box::new(element))
    }

    /// Create an object type from `(name, type)` pairs.
    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Type)>,
        K: Into<String>,
    {
        Self::Object(attributes.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether this is a primitive (bool, number, string) type.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(e) | Type::Set(e) | Type::Map(e) => Some(e),
            _ => None,
        }
    }

    /// Resolve the type reached by applying `step` to a value of this type.
    pub fn apply_step(&self, step: &PathStep) -> Result<&Type, ValueError> {
        let invalid = |reason: &str| ValueError::InvalidStep {
            step: step.to_string(),
            target: self.to_string(),
            reason: reason.to_string(),
        };
        match (self, step) {
            (Type::Object(attrs), PathStep::AttributeName(name)) => attrs
                .get(name)
                .ok_or_else(|| invalid("attribute is not defined on the object type")),
            (Type::List(e), PathStep::ElementKeyInt(_)) => Ok(e),
            (Type::Set(e), PathStep::ElementKeyValue(_)) => Ok(e),
            (Type::Map(e), PathStep::ElementKeyString(_)) => Ok(e),
            (Type::Tuple(elems), PathStep::ElementKeyInt(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| elems.get(i))
                .ok_or_else(|| invalid("tuple index out of range")),
            _ => Err(invalid("step kind does not fit the type")),
        }
    }

    /// Resolve the type at the end of `path`.
    pub fn at_path(&self, path: &Path) -> Result<&Type, ValueError> {
        path.steps()
            .iter()
            .try_fold(self, |ty, step| ty.apply_step(step))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::List(e) => write!(f, "list({})", e),
            Type::Set(e) => write!(f, "set({})", e),
            Type::Map(e) => write!(f, "map({})", e),
            Type::Object(attrs) => {
                f.write_str("object({")?;
                for (i, (k, v)) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("})")
            }
            Type::Tuple(elems) => {
                f.write_str("tuple([")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str("])")
            }
        }
    }
}

/// Types serialize to the JSON type-constraint encoding used in protocol
/// schemas: `"string"`, `["list","string"]`, `["object",{"a":"bool"}]`.
impl Serialize for Type {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Type::Bool => s.serialize_str("bool"),
            Type::Number => s.serialize_str("number"),
            Type::String => s.serialize_str("string"),
            Type::List(e) => ("list", e.as_ref()).serialize(s),
            Type::Set(e) => ("set", e.as_ref()).serialize(s),
            Type::Map(e) => ("map", e.as_ref()).serialize(s),
            Type::Object(attrs) => {
                let mut t = s.serialize_tuple(2)?;
                t.serialize_element("object")?;
                t.serialize_element(attrs)?;
                t.end()
            }
            Type::Tuple(elems) => {
                let mut t = s.serialize_tuple(2)?;
                t.serialize_element("tuple")?;
                t.serialize_element(&TupleTypes(elems))?;
                t.end()
            }
        }
    }
}

struct TupleTypes<'a>(&'a [Type]);

impl Serialize for TupleTypes<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(self.0.len()))?;
        for t in self.0 {
            seq.serialize_element(t)?;
        }
        seq.end()
    }
}

#[derive(Debug, Clone)]
enum Data {
    Null,
    Unknown,
    Bool(bool),
    Number(Number),
    String(String),
    /// Elements of a list, set or tuple.
    Elements(Vec<Value>),
    /// Entries of a map or attributes of an object.
    Entries(BTreeMap<String, Value>),
}

/// A typed value that may be null or unknown.
#[derive(Debug, Clone)]
pub struct Value {
    ty: Type,
    data: Data,
}

impl Value {
    /// A null value of the given type.
    pub fn null(ty: Type) -> Self {
        Self {
            ty,
            data: Data::Null,
        }
    }

    /// An unknown value of the given type.
    pub fn unknown(ty: Type) -> Self {
        Self {
            ty,
            data: Data::Unknown,
        }
    }

    /// A known boolean.
    pub fn bool(b: bool) -> Self {
        Self {
            ty: Type::Bool,
            data: Data::Bool(b),
        }
    }

    /// A known string.
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            ty: Type::String,
            data: Data::String(s.into()),
        }
    }

    /// A known number.
    pub fn number(n: Number) -> Self {
        Self {
            ty: Type::Number,
            data: Data::Number(n),
        }
    }

    /// A known integer number.
    pub fn int(i: i64) -> Self {
        Self::number(Number::from(i))
    }

    /// A known floating point number. Non-finite input yields a null number.
    pub fn float(f: f64) -> Self {
        match Number::from_f64(f) {
            Some(n) => Self::number(normalize_number(n)),
            None => Self::null(Type::Number),
        }
    }

    /// A known list. Elements are expected to be of type `element`.
    pub fn list(element: Type, elements: Vec<Value>) -> Self {
        Self {
            ty: Type::list(element),
            data: Data::Elements(elements),
        }
    }

    /// A known set. Duplicate elements are dropped.
    pub fn set(element: Type, elements: Vec<Value>) -> Self {
        let mut unique: Vec<Value> = Vec::with_capacity(elements.len());
        for e in elements {
            if !unique.contains(&e) {
                unique.push(e);
            }
        }
        Self {
            ty: Type::set(element),
            data: Data::Elements(unique),
        }
    }

    /// A known map.
    pub fn map(element: Type, entries: BTreeMap<String, Value>) -> Self {
        Self {
            ty: Type::map(element),
            data: Data::Entries(entries),
        }
    }

    /// A known object. The object type is taken from the attribute values.
    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entries: BTreeMap<String, Value> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        let ty = Type::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), v.ty.clone()))
                .collect(),
        );
        Self {
            ty,
            data: Data::Entries(entries),
        }
    }

    /// A known tuple. The tuple type is taken from the element values.
    pub fn tuple(elements: Vec<Value>) -> Self {
        let ty = Type::Tuple(elements.iter().map(|e| e.ty.clone()).collect());
        Self {
            ty,
            data: Data::Elements(elements),
        }
    }

    /// Build a known object of type `ty` from `attributes`, checking each
    /// attribute against the declared type. Missing attributes become null.
    pub fn object_of_type(
        ty: &Type,
        mut attributes: BTreeMap<String, Value>,
    ) -> Result<Self, ValueError> {
        let Type::Object(attr_types) = ty else {
            return Err(ValueError::Conversion(format!(
                "cannot build an object value of type {}",
                ty
            )));
        };
        if let Some(extra) = attributes.keys().find(|k| !attr_types.contains_key(*k)) {
            return Err(ValueError::UnsupportedAttribute {
                path: Path::empty(),
                name: extra.clone(),
            });
        }
        let mut entries = BTreeMap::new();
        for (name, attr_ty) in attr_types {
            let value = attributes
                .remove(name)
                .unwrap_or_else(|| Value::null(attr_ty.clone()));
            if value.ty != *attr_ty {
                return Err(ValueError::TypeMismatch {
                    path: Path::root(name.clone()),
                    expected: attr_ty.to_string(),
                    got: value.ty.to_string(),
                });
            }
            entries.insert(name.clone(), value);
        }
        Ok(Self {
            ty: ty.clone(),
            data: Data::Entries(entries),
        })
    }

    /// The value's type.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.data, Data::Null)
    }

    /// Whether the value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self.data, Data::Unknown)
    }

    /// Whether the value itself is known. Children may still be unknown.
    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    /// Whether neither the value nor any descendant is unknown.
    pub fn is_fully_known(&self) -> bool {
        match &self.data {
            Data::Unknown => false,
            Data::Elements(elems) => elems.iter().all(Value::is_fully_known),
            Data::Entries(entries) => entries.values().all(Value::is_fully_known),
            _ => true,
        }
    }

    /// The boolean payload, if this is a known bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            Data::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The string payload, if this is a known string.
    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number payload, if this is a known number.
    pub fn as_number(&self) -> Option<&Number> {
        match &self.data {
            Data::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The number payload as an `i64`, if representable.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(Number::as_i64)
    }

    /// The number payload as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().and_then(Number::as_f64)
    }

    /// Elements of a known list, set or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match &self.data {
            Data::Elements(e) => Some(e),
            _ => None,
        }
    }

    /// Entries of a known map or attributes of a known object.
    pub fn entries(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.data {
            Data::Entries(e) => Some(e),
            _ => None,
        }
    }

    /// Attribute `name` of a known object.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        match (&self.ty, &self.data) {
            (Type::Object(_), Data::Entries(e)) => e.get(name),
            _ => None,
        }
    }

    /// Apply a single path step.
    pub fn apply_step(&self, step: &PathStep) -> Result<&Value, ValueError> {
        let invalid = |reason: &str| ValueError::InvalidStep {
            step: step.to_string(),
            target: self.ty.to_string(),
            reason: reason.to_string(),
        };
        match &self.data {
            Data::Null => return Err(invalid("value is null")),
            Data::Unknown => return Err(invalid("value is unknown")),
            _ => {}
        }
        match (&self.ty, &self.data, step) {
            (Type::Object(_), Data::Entries(e), PathStep::AttributeName(name)) => {
                e.get(name).ok_or_else(|| invalid("no such attribute"))
            }
            (Type::Map(_), Data::Entries(e), PathStep::ElementKeyString(key)) => {
                e.get(key).ok_or_else(|| invalid("no such map key"))
            }
            (Type::List(_) | Type::Tuple(_), Data::Elements(e), PathStep::ElementKeyInt(i)) => {
                usize::try_from(*i)
                    .ok()
                    .and_then(|i| e.get(i))
                    .ok_or_else(|| invalid("index out of range"))
            }
            (Type::Set(_), Data::Elements(e), PathStep::ElementKeyValue(v)) => e
                .iter()
                .find(|elem| *elem == v)
                .ok_or_else(|| invalid("value is not an element of the set")),
            _ => Err(invalid("step kind does not fit the value")),
        }
    }

    /// Walk `path` from this value.
    pub fn at_path(&self, path: &Path) -> Result<&Value, ValueError> {
        path.steps()
            .iter()
            .try_fold(self, |v, step| v.apply_step(step))
    }

    /// Pre-order walk. The callback returns whether to descend into the
    /// children of the node it was given.
    pub fn walk<F, E>(&self, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&Path, &Value) -> Result<bool, E>,
    {
        self.walk_inner(&mut Path::empty(), f)
    }

    fn walk_inner<F, E>(&self, path: &mut Path, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&Path, &Value) -> Result<bool, E>,
    {
        if !f(path, self)? {
            return Ok(());
        }
        for (step, child) in self.children() {
            path.push(step);
            let res = child.walk_inner(path, f);
            path.pop();
            res?;
        }
        Ok(())
    }

    /// Post-order transform: every child is transformed before its parent is
    /// handed to the callback. The root is visited last with an empty path.
    pub fn transform<F, E>(self, f: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Path, Value) -> Result<Value, E>,
    {
        self.transform_inner(&mut Path::empty(), f)
    }

    fn transform_inner<F, E>(self, path: &mut Path, f: &mut F) -> Result<Value, E>
    where
        F: FnMut(&Path, Value) -> Result<Value, E>,
    {
        let Value { ty, data } = self;
        let data = match data {
            Data::Elements(elems) => {
                let mut out = Vec::with_capacity(elems.len());
                for (i, elem) in elems.into_iter().enumerate() {
                    let step = match ty {
                        Type::Set(_) => PathStep::ElementKeyValue(elem.clone()),
                        _ => PathStep::ElementKeyInt(i as i64),
                    };
                    path.push(step);
                    let res = elem.transform_inner(path, f);
                    path.pop();
                    out.push(res?);
                }
                Data::Elements(out)
            }
            Data::Entries(entries) => {
                let mut out = BTreeMap::new();
                for (key, child) in entries {
                    let step = match ty {
                        Type::Object(_) => PathStep::AttributeName(key.clone()),
                        _ => PathStep::ElementKeyString(key.clone()),
                    };
                    path.push(step);
                    let res = child.transform_inner(path, f);
                    path.pop();
                    out.insert(key, res?);
                }
                Data::Entries(out)
            }
            other => other,
        };
        f(path, Value { ty, data })
    }

    /// Replace the value at `path` with `new`, creating parents as needed.
    ///
    /// Null or unknown parents are materialised as empty containers (objects
    /// get null attributes). Lists only grow by the next index; tuples never
    /// grow. The value's type at `path` must match `new`'s type.
    pub fn set_at_path(&mut self, path: &Path, new: Value) -> Result<(), ValueError> {
        let expected = self.ty.at_path(path)?;
        if *expected != new.ty {
            return Err(ValueError::TypeMismatch {
                path: path.clone(),
                expected: expected.to_string(),
                got: new.ty.to_string(),
            });
        }
        self.upsert(path.steps(), 0, path, new)
    }

    fn upsert(
        &mut self,
        steps: &[PathStep],
        depth: usize,
        full: &Path,
        new: Value,
    ) -> Result<(), ValueError> {
        let Some(step) = steps.get(depth) else {
            *self = new;
            return Ok(());
        };
        if matches!(self.data, Data::Null | Data::Unknown) {
            self.data = empty_container(&self.ty);
        }
        let child_ty = self.ty.apply_step(step)?.clone();
        match (&mut self.data, step) {
            (Data::Entries(entries), PathStep::AttributeName(key))
            | (Data::Entries(entries), PathStep::ElementKeyString(key)) => {
                let child = entries
                    .entry(key.clone())
                    .or_insert_with(|| Value::null(child_ty));
                child.upsert(steps, depth + 1, full, new)
            }
            (Data::Elements(elems), PathStep::ElementKeyInt(i)) => {
                let index = usize::try_from(*i).ok().filter(|i| *i <= elems.len());
                let is_tuple = matches!(self.ty, Type::Tuple(_));
                match index {
                    Some(i) if i < elems.len() => elems[i].upsert(steps, depth + 1, full, new),
                    Some(_) if !is_tuple => {
                        let mut child = Value::null(child_ty);
                        child.upsert(steps, depth + 1, full, new)?;
                        elems.push(child);
                        Ok(())
                    }
                    _ => Err(ValueError::ListIndexOutOfRange {
                        path: Path::from_steps(steps[..depth].to_vec()),
                        index: *i,
                        len: elems.len(),
                    }),
                }
            }
            (Data::Elements(elems), PathStep::ElementKeyValue(key)) => {
                match elems.iter().position(|e| e == key) {
                    Some(pos) => {
                        let mut child = elems.remove(pos);
                        child.upsert(steps, depth + 1, full, new)?;
                        if !elems.contains(&child) {
                            elems.insert(pos, child);
                        }
                    }
                    None => {
                        let mut child = key.clone();
                        child.upsert(steps, depth + 1, full, new)?;
                        if !elems.contains(&child) {
                            elems.push(child);
                        }
                    }
                }
                Ok(())
            }
            _ => Err(ValueError::InvalidStep {
                step: step.to_string(),
                target: full.to_string(),
                reason: "step kind does not fit the value".to_string(),
            }),
        }
    }

    fn children(&self) -> Vec<(PathStep, &Value)> {
        match (&self.ty, &self.data) {
            (Type::Set(_), Data::Elements(elems)) => elems
                .iter()
                .map(|e| (PathStep::ElementKeyValue(e.clone()), e))
                .collect(),
            (_, Data::Elements(elems)) => elems
                .iter()
                .enumerate()
                .map(|(i, e)| (PathStep::ElementKeyInt(i as i64), e))
                .collect(),
            (Type::Object(_), Data::Entries(entries)) => entries
                .iter()
                .map(|(k, v)| (PathStep::AttributeName(k.clone()), v))
                .collect(),
            (_, Data::Entries(entries)) => entries
                .iter()
                .map(|(k, v)| (PathStep::ElementKeyString(k.clone()), v))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn empty_container(ty: &Type) -> Data {
    match ty {
        Type::Object(attrs) => Data::Entries(
            attrs
                .iter()
                .map(|(k, t)| (k.clone(), Value::null(t.clone())))
                .collect(),
        ),
        Type::Tuple(elems) => Data::Elements(elems.iter().cloned().map(Value::null).collect()),
        Type::Map(_) => Data::Entries(BTreeMap::new()),
        Type::List(_) | Type::Set(_) => Data::Elements(Vec::new()),
        _ => Data::Null,
    }
}

/// Integral decimals are stored as integers so that `1` and `1.0` compare
/// equal and encode identically.
pub(crate) fn normalize_number(n: Number) -> Number {
    if !n.is_f64() {
        return n;
    }
    let integral = match plain_decimal(&n) {
        Some(text) if !text.contains('.') => text,
        _ => return n,
    };
    integral.parse::<i64>().map(Number::from).unwrap_or(n)
}

/// The decimal text of `n` without trailing fractional zeros, when it is
/// written without an exponent.
fn plain_decimal(n: &Number) -> Option<String> {
    let text = n.to_string();
    if text.contains(['e', 'E']) {
        return None;
    }
    Some(match text.split_once('.') {
        Some((int, frac)) => match frac.trim_end_matches('0') {
            "" => int.to_string(),
            frac => format!("{}.{}", int, frac),
        },
        None => text,
    })
}

/// `n` as a float, when a float holds it without rounding.
pub(crate) fn exact_f64(n: &Number) -> Option<f64> {
    let f = n.as_f64()?;
    let back = Number::from_f64(f)?;
    let exact = match (plain_decimal(&back), plain_decimal(n)) {
        (Some(a), Some(b)) => a == b,
        _ => back.to_string() == n.to_string(),
    };
    exact.then_some(f)
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (plain_decimal(a), plain_decimal(b)) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y) == Some(Ordering::Equal),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.data, &other.data) {
            (Data::Null, Data::Null) | (Data::Unknown, Data::Unknown) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Number(a), Data::Number(b)) => numbers_equal(a, b),
            (Data::String(a), Data::String(b)) => a == b,
            (Data::Elements(a), Data::Elements(b)) => match self.ty {
                Type::Set(_) => a.len() == b.len() && a.iter().all(|e| b.contains(e)),
                _ => a == b,
            },
            (Data::Entries(a), Data::Entries(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Data::Null => f.write_str("null"),
            Data::Unknown => f.write_str("<unknown>"),
            Data::Bool(b) => write!(f, "{}", b),
            Data::Number(n) => write!(f, "{}", n),
            Data::String(s) => write!(f, "{:?}", s),
            Data::Elements(elems) => {
                f.write_str("[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str("]")
            }
            Data::Entries(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thing_type() -> Type {
        Type::object([
            ("name", Type::String),
            ("tags", Type::list(Type::String)),
            ("labels", Type::map(Type::String)),
        ])
    }

    fn thing() -> Value {
        Value::object([
            ("name", Value::string("web")),
            (
                "tags",
                Value::list(Type::String, vec![Value::string("a"), Value::string("b")]),
            ),
            (
                "labels",
                Value::map(
                    Type::String,
                    BTreeMap::from([("env".to_string(), Value::string("prod"))]),
                ),
            ),
        ])
    }

    #[test]
    fn test_object_type_inferred() {
        assert_eq!(thing().ty(), &thing_type());
    }

    #[test]
    fn test_null_and_unknown_are_typed() {
        let n = Value::null(Type::String);
        let u = Value::unknown(Type::String);
        assert!(n.is_null());
        assert!(u.is_unknown());
        assert_ne!(n, u);
        assert_ne!(Value::null(Type::String), Value::null(Type::Bool));
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Value::set(Type::String, vec![Value::string("x"), Value::string("y")]);
        let b = Value::set(Type::String, vec![Value::string("y"), Value::string("x")]);
        assert_eq!(a, b);

        let l1 = Value::list(Type::String, vec![Value::string("x"), Value::string("y")]);
        let l2 = Value::list(Type::String, vec![Value::string("y"), Value::string("x")]);
        assert_ne!(l1, l2);
    }

    #[test]
    fn test_set_drops_duplicates() {
        let s = Value::set(Type::String, vec![Value::string("x"), Value::string("x")]);
        assert_eq!(s.elements().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(Value::int(1), Value::float(1.0));
        assert_ne!(Value::int(1), Value::float(1.5));
        assert!(Value::float(f64::NAN).is_null());
    }

    #[test]
    fn test_at_path() {
        let v = thing();
        let p = Path::root("tags").at_list_index(1);
        assert_eq!(v.at_path(&p).unwrap(), &Value::string("b"));

        let p = Path::root("labels").at_map_key("env");
        assert_eq!(v.at_path(&p).unwrap().as_str(), Some("prod"));

        let p = Path::root("tags").at_list_index(5);
        assert!(matches!(v.at_path(&p), Err(ValueError::InvalidStep { .. })));
    }

    #[test]
    fn test_at_path_through_null_fails() {
        let v = Value::object([("tags", Value::null(Type::list(Type::String)))]);
        let p = Path::root("tags").at_list_index(0);
        assert!(v.at_path(&p).is_err());
    }

    #[test]
    fn test_type_at_path() {
        let ty = thing_type();
        let p = Path::root("labels").at_map_key("anything");
        assert_eq!(ty.at_path(&p).unwrap(), &Type::String);
        assert!(ty.at_path(&Path::root("missing")).is_err());
    }

    #[test]
    fn test_walk_prunes() {
        let v = thing();
        let mut seen = Vec::new();
        v.walk(&mut |path: &Path, _v: &Value| -> Result<bool, ()> {
            seen.push(path.to_string());
            Ok(path.is_empty() || path.to_string() == "tags")
        })
        .unwrap();
        assert_eq!(seen, vec!["", "labels", "name", "tags", "tags[0]", "tags[1]"]);
    }

    #[test]
    fn test_transform_is_post_order() {
        let v = thing();
        let mut order = Vec::new();
        let out = v
            .transform(&mut |path: &Path, v: Value| -> Result<Value, ()> {
                order.push(path.to_string());
                if v.as_str() == Some("a") {
                    return Ok(Value::string("A"));
                }
                Ok(v)
            })
            .unwrap();
        assert_eq!(order.last().map(String::as_str), Some(""));
        let tags_pos = order.iter().position(|p| p == "tags").unwrap();
        let child_pos = order.iter().position(|p| p == "tags[0]").unwrap();
        assert!(child_pos < tags_pos);
        assert_eq!(
            out.at_path(&Path::root("tags").at_list_index(0)).unwrap(),
            &Value::string("A")
        );
    }

    #[test]
    fn test_set_at_path_creates_parents() {
        let mut v = Value::null(thing_type());
        v.set_at_path(&Path::root("labels").at_map_key("team"), Value::string("core"))
            .unwrap();
        assert_eq!(
            v.at_path(&Path::root("labels").at_map_key("team")).unwrap(),
            &Value::string("core")
        );
        assert!(v.attribute("name").unwrap().is_null());
    }

    #[test]
    fn test_set_at_path_list_is_append_only() {
        let mut v = thing();
        v.set_at_path(&Path::root("tags").at_list_index(2), Value::string("c"))
            .unwrap();
        assert_eq!(v.attribute("tags").unwrap().elements().unwrap().len(), 3);

        let err = v
            .set_at_path(&Path::root("tags").at_list_index(7), Value::string("z"))
            .unwrap_err();
        assert!(matches!(err, ValueError::ListIndexOutOfRange { index: 7, len: 3, .. }));
    }

    #[test]
    fn test_set_at_path_rejects_wrong_type() {
        let mut v = thing();
        let err = v.set_at_path(&Path::root("name"), Value::bool(true)).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    #[test]
    fn test_object_of_type() {
        let ty = thing_type();
        let v = Value::object_of_type(
            &ty,
            BTreeMap::from([("name".to_string(), Value::string("x"))]),
        )
        .unwrap();
        assert!(v.attribute("tags").unwrap().is_null());

        let err = Value::object_of_type(
            &ty,
            BTreeMap::from([("bogus".to_string(), Value::string("x"))]),
        )
        .unwrap_err();
        assert!(matches!(err, ValueError::UnsupportedAttribute { .. }));
    }

    #[test]
    fn test_type_serializes_as_constraint_json() {
        let ty = Type::object([("a", Type::list(Type::String)), ("b", Type::Bool)]);
        assert_eq!(
            serde_json::to_value(&ty).unwrap(),
            serde_json::json!(["object", {"a": ["list", "string"], "b": "bool"}])
        );
        assert_eq!(
            serde_json::to_value(Type::Tuple(vec![Type::Number])).unwrap(),
            serde_json::json!(["tuple", ["number"]])
        );
    }

    #[test]
    fn test_fully_known() {
        let v = Value::object([("a", Value::unknown(Type::String))]);
        assert!(v.is_known());
        assert!(!v.is_fully_known());
        assert!(thing().is_fully_known());
    }
}
