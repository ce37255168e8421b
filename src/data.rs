//! Schema-aware views over typed values.
//!
//! [`Config`], [`Plan`], [`State`] and [`EphemeralState`] pair a raw
//! [`Value`] with the [`Schema`] describing it. They offer whole-value and
//! single-path reads and writes, plus expression matching. Failures come
//! back as diagnostics phrased for provider developers.

use std::convert::Infallible;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::diag::{Diagnostic, Diagnostics};
use crate::path::{Expression, ExpressionStep, Path};
use crate::reflect::{from_serializable, into_deserializable, value_from_json};
use crate::schema::Schema;
use crate::value::{Type, Value};

const REPORT: &str = "This is always an error in the provider. \
                      Please report the following to the provider developer:\n\n";

fn conversion_error(err: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error(
        "Value Conversion Error",
        format!(
            "An unexpected error was encountered trying to convert the value. {}{}",
            REPORT, err
        ),
    )
}

/// The value at `path`, or a typed stand-in when part of the path does not
/// exist: unknown when the deepest existing ancestor is unknown, null
/// otherwise.
fn value_or_absent(raw: &Value, path: &Path, ty: Type) -> Value {
    let mut current = raw;
    for step in path.steps() {
        match current.apply_step(step) {
            Ok(next) => current = next,
            Err(_) if current.is_unknown() => return Value::unknown(ty),
            Err(_) => return Value::null(ty),
        }
    }
    current.clone()
}

/// Whether every step of `expr` can be applied to the schema's type.
pub fn valid_path_expression(schema: &Schema, expr: &Expression) -> bool {
    let resolved = expr.resolve();
    let mut ty = schema.terraform_type();
    for step in resolved.steps() {
        let next = match (&ty, step) {
            (Type::Object(attrs), ExpressionStep::AttributeNameExact(name)) => {
                attrs.get(name).cloned()
            }
            (
                Type::List(e),
                ExpressionStep::ElementKeyIntExact(_) | ExpressionStep::ElementKeyIntAny,
            )
            | (
                Type::Map(e),
                ExpressionStep::ElementKeyStringExact(_) | ExpressionStep::ElementKeyStringAny,
            )
            | (
                Type::Set(e),
                ExpressionStep::ElementKeyValueExact(_) | ExpressionStep::ElementKeyValueAny,
            ) => Some((**e).clone()),
            (Type::Tuple(elems), ExpressionStep::ElementKeyIntExact(i)) => {
                usize::try_from(*i).ok().and_then(|i| elems.get(i)).cloned()
            }
            _ => None,
        };
        match next {
            Some(t) => ty = t,
            None => return false,
        }
    }
    true
}

/// All concrete paths in `raw` matched by `expr`.
///
/// Where a parent of a potential match is null or unknown, the parent path is
/// returned instead. Matching nothing at all is reported as an error.
///
/// The expression is matched from the schema root, so a relative expression
/// must already be merged onto the expression it is relative to. Parent
/// steps are resolved before the walk.
pub fn path_matches(schema: &Schema, raw: &Value, expr: &Expression) -> (Vec<Path>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let expr = &expr.resolve();
    if !valid_path_expression(schema, expr) {
        diags.add_error(
            "Invalid Path Expression for Schema",
            format!(
                "The Terraform Provider unexpectedly provided a path expression \
                 that does not match the current schema. This can happen if the path expression \
                 does not correctly follow the schema in structure or types. \
                 Please report this to the provider developers.\n\nPath Expression: {}",
                expr
            ),
        );
        return (Vec::new(), diags);
    }

    let mut matches = Vec::new();
    let walked = raw.walk(&mut |path: &Path, value: &Value| -> Result<bool, Infallible> {
        if expr.matches(path) {
            matches.push(path.clone());
            return Ok(false);
        }
        if !expr.matches_parent(path) {
            return Ok(false);
        }
        if value.is_null() || value.is_unknown() {
            matches.push(path.clone());
            return Ok(false);
        }
        Ok(true)
    });
    if let Err(never) = walked {
        match never {}
    }

    if matches.is_empty() {
        diags.add_error(
            "Invalid Path Expression for Schema Data",
            format!(
                "The Terraform Provider unexpectedly matched no paths with the given \
                 path expression and current schema data. This can happen if the path expression \
                 does not correctly follow the schema in structure or types. \
                 Please report this to the provider developers.\n\nPath Expression: {}",
                expr
            ),
        );
    }
    (matches, diags)
}

macro_rules! schema_data {
    ($(#[$meta:meta])* $name:ident, $summary:literal, $noun:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            /// The raw value. Its type is the schema's wire type.
            pub raw: Value,
            /// The schema describing `raw`.
            pub schema: Schema,
        }

        impl $name {
            /// Wrap a value decoded with `schema`.
            pub fn new(schema: Schema, raw: Value) -> Self {
                Self { raw, schema }
            }

            /// A null value of the schema's type.
            pub fn null(schema: Schema) -> Self {
                let raw = Value::null(schema.terraform_type());
                Self { raw, schema }
            }

            fn read_error(detail: impl std::fmt::Display) -> Diagnostic {
                Diagnostic::error(
                    concat!($summary, " Read Error"),
                    format!(
                        concat!(
                            "An unexpected error was encountered ",
                            "trying to read an attribute from the ",
                            $noun,
                            ". {}{}"
                        ),
                        REPORT,
                        detail
                    ),
                )
            }

            fn write_error(detail: impl std::fmt::Display) -> Diagnostic {
                Diagnostic::error(
                    concat!($summary, " Write Error"),
                    format!(
                        concat!(
                            "An unexpected error was encountered trying to write the ",
                            $noun,
                            ". {}{}"
                        ),
                        REPORT,
                        detail
                    ),
                )
            }

            /// Decode the whole value into `T`.
            pub fn get<T: DeserializeOwned>(&self) -> Result<T, Diagnostics> {
                into_deserializable(&self.raw).map_err(|err| conversion_error(err).into())
            }

            /// The typed value at `path`. Paths whose parents are absent
            /// yield a typed null (or unknown, under an unknown parent).
            pub fn value_at_path(&self, path: &Path) -> Result<Value, Diagnostics> {
                let ty = self.schema.type_at_path(path).map_err(|err| {
                    Diagnostics::from(
                        Self::read_error(format!("error getting attribute type in schema: {}", err))
                            .with_path(path.clone()),
                    )
                })?;
                Ok(value_or_absent(&self.raw, path, ty))
            }

            /// Decode the value at `path` into `T`.
            pub fn get_attribute<T: DeserializeOwned>(
                &self,
                path: &Path,
            ) -> Result<T, Diagnostics> {
                let value = self.value_at_path(path)?;
                into_deserializable(&value)
                    .map_err(|err| conversion_error(err).with_path(path.clone()).into())
            }

            /// Whether a value (possibly null) exists at `path`.
            pub fn path_exists(&self, path: &Path) -> bool {
                self.raw.at_path(path).is_ok()
            }

            /// All concrete paths matched by `expr`. See [`path_matches`].
            pub fn path_matches(&self, expr: &Expression) -> (Vec<Path>, Diagnostics) {
                path_matches(&self.schema, &self.raw, expr)
            }

            /// Replace the whole value from serializable data.
            ///
            /// An untyped null is refused: use a typed null value through
            /// [`Self::set_value`] to express absence.
            pub fn set<T: Serialize + ?Sized>(&mut self, val: &T) -> Diagnostics {
                let json = match serde_json::to_value(val) {
                    Ok(json) => json,
                    Err(err) => return conversion_error(err).into(),
                };
                if json.is_null() {
                    return Self::write_error(concat!(
                        "cannot set nil as entire ", $noun,
                        "; to remove a resource from state, call State::remove_resource, instead"
                    ))
                    .into();
                }
                match value_from_json(&self.schema.terraform_type(), &json, &Path::empty()) {
                    Ok(value) => {
                        self.raw = value;
                        Diagnostics::new()
                    }
                    Err(err) => conversion_error(err).into(),
                }
            }

            /// Replace the whole value.
            pub fn set_value(&mut self, value: Value) -> Diagnostics {
                let expected = self.schema.terraform_type();
                if *value.ty() != expected {
                    return Self::write_error(format!(
                        "value of type {} does not match schema type {}",
                        value.ty(),
                        expected
                    ))
                    .into();
                }
                self.raw = value;
                Diagnostics::new()
            }

            /// Set the value at `path` from serializable data, creating
            /// parents as needed. Lists only grow by their next index.
            pub fn set_attribute<T: Serialize + ?Sized>(
                &mut self,
                path: &Path,
                val: &T,
            ) -> Diagnostics {
                let ty = match self.schema.type_at_path(path) {
                    Ok(ty) => ty,
                    Err(err) => {
                        let detail = format!("error getting attribute type in schema: {}", err);
                        return Self::write_error(detail).with_path(path.clone()).into();
                    }
                };
                match from_serializable(&ty, val, path) {
                    Ok(value) => self.set_attribute_value(path, value),
                    Err(err) => conversion_error(err).with_path(path.clone()).into(),
                }
            }

            /// Set the typed value at `path`, creating parents as needed.
            pub fn set_attribute_value(&mut self, path: &Path, value: Value) -> Diagnostics {
                match self.raw.set_at_path(path, value) {
                    Ok(()) => Diagnostics::new(),
                    Err(err) => {
                        Self::write_error(format!(concat!("Cannot transform ", $noun, ": {}"), err))
                            .with_path(path.clone())
                            .into()
                    }
                }
            }
        }
    };
}

schema_data!(
    /// Practitioner configuration. Computed-only attributes are null and
    /// values may be unknown during planning.
    Config,
    "Configuration",
    "configuration"
);

schema_data!(
    /// A proposed or planned new state.
    Plan,
    "Plan",
    "plan"
);

schema_data!(
    /// Resource state as stored by the host.
    State,
    "State",
    "state"
);

schema_data!(
    /// State that only lives for the duration of one operation.
    EphemeralState,
    "Ephemeral State",
    "ephemeral state"
);

impl State {
    /// Mark the resource as removed. The host drops it from state.
    pub fn remove_resource(&mut self) {
        self.raw = Value::null(self.schema.terraform_type());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;
    use crate::schema::{Attribute, AttributeFlags, AttributeType, NestedAttributes};

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "tags",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute(
                "rules",
                Attribute::nested(
                    NestedAttributes::list(BTreeMap::from([(
                        "port".to_string(),
                        Attribute::required_int64(),
                    )])),
                    AttributeFlags::optional(),
                ),
            )
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Model {
        name: String,
        id: Option<String>,
        tags: Option<Vec<String>>,
        rules: Option<Vec<Rule>>,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rule {
        port: i64,
    }

    fn model() -> Model {
        Model {
            name: "web".to_string(),
            id: None,
            tags: Some(vec!["a".to_string(), "b".to_string()]),
            rules: Some(vec![Rule { port: 80 }, Rule { port: 443 }]),
        }
    }

    #[test]
    fn test_set_then_get() {
        let mut state = State::null(schema());
        let diags = state.set(&model());
        assert!(!diags.has_error(), "{:?}", diags);
        let back: Model = state.get().unwrap();
        assert_eq!(back, model());
    }

    #[test]
    fn test_set_rejects_untyped_null() {
        let mut state = State::null(schema());
        let diags = state.set(&Option::<Model>::None);
        assert!(diags.has_error());
        let d = diags.iter().next().unwrap();
        assert_eq!(d.summary, "State Write Error");
        assert!(d.detail.contains("State::remove_resource"));
    }

    #[test]
    fn test_get_attribute() {
        let mut plan = Plan::null(schema());
        assert!(!plan.set(&model()).has_error());

        let name: String = plan.get_attribute(&Path::root("name")).unwrap();
        assert_eq!(name, "web");

        let port: i64 = plan
            .get_attribute(&Path::root("rules").at_list_index(1).at_name("port"))
            .unwrap();
        assert_eq!(port, 443);
    }

    #[test]
    fn test_value_at_path_missing_parent_is_typed_null() {
        let config = Config::null(schema());
        let v = config
            .value_at_path(&Path::root("rules").at_list_index(0).at_name("port"))
            .unwrap();
        assert!(v.is_null());
        assert_eq!(v.ty(), &Type::Number);
    }

    #[test]
    fn test_value_at_path_under_unknown_parent_is_unknown() {
        let mut plan = Plan::null(schema());
        assert!(!plan.set(&model()).has_error());
        let rules_ty = schema().type_at_path(&Path::root("rules")).unwrap();
        assert!(!plan
            .set_attribute_value(&Path::root("rules"), Value::unknown(rules_ty))
            .has_error());

        let v = plan
            .value_at_path(&Path::root("rules").at_list_index(0).at_name("port"))
            .unwrap();
        assert!(v.is_unknown());
    }

    #[test]
    fn test_value_at_path_invalid_for_schema() {
        let config = Config::null(schema());
        let diags = config.value_at_path(&Path::root("nope")).unwrap_err();
        assert_eq!(diags.iter().next().unwrap().summary, "Configuration Read Error");
    }

    #[test]
    fn test_set_attribute_creates_parents() {
        let mut state = State::null(schema());
        let p = Path::root("rules").at_list_index(0).at_name("port");
        let diags = state.set_attribute(&p, &8080);
        assert!(!diags.has_error(), "{:?}", diags);
        assert_eq!(state.get_attribute::<i64>(&p).unwrap(), 8080);
        assert!(state.path_exists(&Path::root("name")));
    }

    #[test]
    fn test_set_attribute_list_append_only() {
        let mut state = State::null(schema());
        let diags = state.set_attribute(&Path::root("tags").at_list_index(2), "x");
        assert!(diags.has_error());
        assert_eq!(diags.iter().next().unwrap().summary, "State Write Error");
        assert_eq!(diags.iter().next().unwrap().path, Some(Path::root("tags").at_list_index(2)));
    }

    #[test]
    fn test_set_attribute_conversion_error() {
        let mut state = State::null(schema());
        let diags = state.set_attribute(&Path::root("name"), &true);
        assert_eq!(diags.iter().next().unwrap().summary, "Value Conversion Error");
    }

    #[test]
    fn test_remove_resource() {
        let mut state = State::null(schema());
        assert!(!state.set(&model()).has_error());
        state.remove_resource();
        assert!(state.raw.is_null());
    }

    #[test]
    fn test_path_matches() {
        let mut config = Config::null(schema());
        assert!(!config.set(&model()).has_error());

        let expr = Expression::match_root("rules").at_any_list_index().at_name("port");
        let (paths, diags) = config.path_matches(&expr);
        assert!(!diags.has_error());
        assert_eq!(
            paths,
            vec![
                Path::root("rules").at_list_index(0).at_name("port"),
                Path::root("rules").at_list_index(1).at_name("port"),
            ]
        );
    }

    #[test]
    fn test_path_matches_null_parent() {
        let mut config = Config::null(schema());
        let mut m = model();
        m.rules = None;
        assert!(!config.set(&m).has_error());

        let expr = Expression::match_root("rules").at_any_list_index().at_name("port");
        let (paths, diags) = config.path_matches(&expr);
        assert!(!diags.has_error());
        assert_eq!(paths, vec![Path::root("rules")]);
    }

    #[test]
    fn test_path_matches_no_match_is_error() {
        let mut config = Config::null(schema());
        let mut m = model();
        m.rules = Some(Vec::new());
        assert!(!config.set(&m).has_error());

        let expr = Expression::match_root("rules").at_list_index(4).at_name("port");
        let (paths, diags) = config.path_matches(&expr);
        assert!(paths.is_empty());
        assert_eq!(
            diags.iter().next().unwrap().summary,
            "Invalid Path Expression for Schema Data"
        );
    }

    #[test]
    fn test_path_matches_invalid_expression() {
        let config = Config::null(schema());
        let (paths, diags) = config.path_matches(&Expression::match_root("not-test"));
        assert!(paths.is_empty());
        let d = diags.iter().next().unwrap();
        assert_eq!(d.summary, "Invalid Path Expression for Schema");
        assert!(d.detail.ends_with("Path Expression: not-test"));
    }

    #[test]
    fn test_path_matches_resolves_parent_steps() {
        let mut config = Config::null(schema());
        assert!(!config.set(&model()).has_error());

        let expr = Expression::match_root("rules")
            .at_any_list_index()
            .at_name("port")
            .at_parent();
        let (paths, diags) = config.path_matches(&expr);
        assert!(!diags.has_error(), "{:?}", diags);
        assert_eq!(
            paths,
            vec![Path::root("rules").at_list_index(0), Path::root("rules").at_list_index(1)]
        );

        let merged =
            Expression::match_root("rules").merge(&Expression::match_relative().at_list_index(1));
        let (paths, _) = config.path_matches(&merged.at_name("port"));
        assert_eq!(paths, vec![Path::root("rules").at_list_index(1).at_name("port")]);
    }

    #[test]
    fn test_set_value_checks_type() {
        let mut plan = Plan::null(schema());
        assert!(plan.set_value(Value::string("x")).has_error());
        assert!(!plan.set_value(Value::null(schema().terraform_type())).has_error());
    }
}
