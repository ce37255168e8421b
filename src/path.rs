//! Paths and path expressions.
//!
//! A [`Path`] names one concrete location in a value tree. An [`Expression`]
//! names a class of locations: it may use "any element" steps and parent
//! steps, and can be rooted at the schema or relative to another expression.

use std::fmt;

use crate::value::Value;

/// One step of a concrete [`Path`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// Object attribute by name.
    AttributeName(String),
    /// Map element by key.
    ElementKeyString(String),
    /// List or tuple element by position.
    ElementKeyInt(i64),
    /// Set element by its value.
    ElementKeyValue(Value),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::AttributeName(name) => f.write_str(name),
            PathStep::ElementKeyString(key) => write!(f, "[{:?}]", key),
            PathStep::ElementKeyInt(i) => write!(f, "[{}]", i),
            PathStep::ElementKeyValue(v) => write!(f, "[Value({})]", v),
        }
    }
}

/// A concrete location in a value tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    /// The empty path, pointing at the root value.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A path starting at a top-level attribute.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            steps: vec![PathStep::AttributeName(name.into())],
        }
    }

    /// Build a path from raw steps.
    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// Extend with an attribute name.
    pub fn at_name(&self, name: impl Into<String>) -> Self {
        self.with_step(PathStep::AttributeName(name.into()))
    }

    /// Extend with a list index.
    pub fn at_list_index(&self, index: i64) -> Self {
        self.with_step(PathStep::ElementKeyInt(index))
    }

    /// Extend with a map key.
    pub fn at_map_key(&self, key: impl Into<String>) -> Self {
        self.with_step(PathStep::ElementKeyString(key.into()))
    }

    /// Extend with a set element value.
    pub fn at_set_value(&self, value: Value) -> Self {
        self.with_step(PathStep::ElementKeyValue(value))
    }

    /// Extend with an arbitrary step.
    pub fn with_step(&self, step: PathStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    pub(crate) fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    pub(crate) fn pop(&mut self) -> Option<PathStep> {
        self.steps.pop()
    }

    /// The path without its last step. The empty path is its own parent.
    pub fn parent_path(&self) -> Path {
        let mut steps = self.steps.clone();
        steps.pop();
        Self { steps }
    }

    /// The last step, if any.
    pub fn last_step(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// All steps in order.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Whether the path points at the root value.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// An exact, root-anchored expression for this path.
    pub fn expression(&self) -> Expression {
        Expression {
            root: true,
            steps: self.steps.iter().map(ExpressionStep::exact).collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 && matches!(step, PathStep::AttributeName(_)) {
                f.write_str(".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// One step of an [`Expression`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionStep {
    /// Attribute with exactly this name.
    AttributeNameExact(String),
    /// List element at exactly this position.
    ElementKeyIntExact(i64),
    /// Any list element.
    ElementKeyIntAny,
    /// Map element with exactly this key.
    ElementKeyStringExact(String),
    /// Any map element.
    ElementKeyStringAny,
    /// Set element equal to this value.
    ElementKeyValueExact(Value),
    /// Any set element.
    ElementKeyValueAny,
    /// Step back to the parent of the preceding step.
    Parent,
}

impl ExpressionStep {
    fn exact(step: &PathStep) -> Self {
        match step {
            PathStep::AttributeName(n) => Self::AttributeNameExact(n.clone()),
            PathStep::ElementKeyString(k) => Self::ElementKeyStringExact(k.clone()),
            PathStep::ElementKeyInt(i) => Self::ElementKeyIntExact(*i),
            PathStep::ElementKeyValue(v) => Self::ElementKeyValueExact(v.clone()),
        }
    }

    /// Whether this step accepts the concrete `step`.
    pub fn matches(&self, step: &PathStep) -> bool {
        match (self, step) {
            (Self::AttributeNameExact(a), PathStep::AttributeName(b)) => a == b,
            (Self::ElementKeyIntExact(a), PathStep::ElementKeyInt(b)) => a == b,
            (Self::ElementKeyIntAny, PathStep::ElementKeyInt(_)) => true,
            (Self::ElementKeyStringExact(a), PathStep::ElementKeyString(b)) => a == b,
            (Self::ElementKeyStringAny, PathStep::ElementKeyString(_)) => true,
            (Self::ElementKeyValueExact(a), PathStep::ElementKeyValue(b)) => a == b,
            (Self::ElementKeyValueAny, PathStep::ElementKeyValue(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExpressionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeNameExact(n) => f.write_str(n),
            Self::ElementKeyIntExact(i) => write!(f, "[{}]", i),
            Self::ElementKeyIntAny => f.write_str("[*]"),
            Self::ElementKeyStringExact(k) => write!(f, "[{:?}]", k),
            Self::ElementKeyStringAny => f.write_str("[\"*\"]"),
            Self::ElementKeyValueExact(v) => write!(f, "[Value({})]", v),
            Self::ElementKeyValueAny => f.write_str("[Value(*)]"),
            Self::Parent => f.write_str("<"),
        }
    }
}

/// A pattern over paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    root: bool,
    steps: Vec<ExpressionStep>,
}

impl Expression {
    /// An expression anchored at a top-level attribute.
    pub fn match_root(name: impl Into<String>) -> Self {
        Self {
            root: true,
            steps: vec![ExpressionStep::AttributeNameExact(name.into())],
        }
    }

    /// An empty expression relative to whatever it is merged onto.
    pub fn match_relative() -> Self {
        Self::default()
    }

    fn with(&self, step: ExpressionStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self {
            root: self.root,
            steps,
        }
    }

    /// Extend with an attribute name.
    pub fn at_name(&self, name: impl Into<String>) -> Self {
        self.with(ExpressionStep::AttributeNameExact(name.into()))
    }

    /// Extend with a list index.
    pub fn at_list_index(&self, index: i64) -> Self {
        self.with(ExpressionStep::ElementKeyIntExact(index))
    }

    /// Extend with any list index.
    pub fn at_any_list_index(&self) -> Self {
        self.with(ExpressionStep::ElementKeyIntAny)
    }

    /// Extend with a map key.
    pub fn at_map_key(&self, key: impl Into<String>) -> Self {
        self.with(ExpressionStep::ElementKeyStringExact(key.into()))
    }

    /// Extend with any map key.
    pub fn at_any_map_key(&self) -> Self {
        self.with(ExpressionStep::ElementKeyStringAny)
    }

    /// Extend with a set element value.
    pub fn at_set_value(&self, value: Value) -> Self {
        self.with(ExpressionStep::ElementKeyValueExact(value))
    }

    /// Extend with any set element.
    pub fn at_any_set_value(&self) -> Self {
        self.with(ExpressionStep::ElementKeyValueAny)
    }

    /// Step back to the parent.
    pub fn at_parent(&self) -> Self {
        self.with(ExpressionStep::Parent)
    }

    /// Whether the expression is anchored at the schema root.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Raw steps, including unresolved parent steps.
    pub fn steps(&self) -> &[ExpressionStep] {
        &self.steps
    }

    /// Combine with `other`. A root-anchored `other` replaces `self`; a
    /// relative one is appended.
    pub fn merge(&self, other: &Expression) -> Self {
        if other.root {
            return other.clone();
        }
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Self {
            root: self.root,
            steps,
        }
    }

    /// Collapse parent steps against their predecessors.
    pub fn resolve(&self) -> Self {
        let mut steps: Vec<ExpressionStep> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if *step == ExpressionStep::Parent {
                steps.pop();
            } else {
                steps.push(step.clone());
            }
        }
        Self {
            root: self.root,
            steps,
        }
    }

    /// Whether `path` is exactly one of the locations this expression names.
    pub fn matches(&self, path: &Path) -> bool {
        let resolved = self.resolve();
        if resolved.steps.is_empty() || resolved.steps.len() != path.len() {
            return false;
        }
        resolved
            .steps
            .iter()
            .zip(path.steps())
            .all(|(e, p)| e.matches(p))
    }

    /// Whether `path` is a strict ancestor of some location this expression
    /// names.
    pub fn matches_parent(&self, path: &Path) -> bool {
        let resolved = self.resolve();
        if resolved.steps.len() <= path.len() {
            return false;
        }
        resolved
            .steps
            .iter()
            .zip(path.steps())
            .all(|(e, p)| e.matches(p))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            let dotted = matches!(
                step,
                ExpressionStep::AttributeNameExact(_) | ExpressionStep::Parent
            );
            if i > 0 && dotted {
                f.write_str(".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    #[test]
    fn test_path_display() {
        assert_eq!(Path::root("test1").at_name("test2").to_string(), "test1.test2");
        assert_eq!(
            Path::root("test1").at_list_index(0).at_name("test2").to_string(),
            "test1[0].test2"
        );
        assert_eq!(
            Path::root("test").at_map_key("k1").at_map_key("k2").to_string(),
            r#"test["k1"]["k2"]"#
        );
        assert_eq!(
            Path::root("test").at_set_value(Value::string("v")).to_string(),
            r#"test[Value("v")]"#
        );
        assert_eq!(Path::empty().to_string(), "");
    }

    #[test]
    fn test_expression_display() {
        let e = Expression::match_root("test").at_any_list_index();
        assert_eq!(e.to_string(), "test[*]");
        assert_eq!(Expression::match_root("test").at_any_map_key().to_string(), r#"test["*"]"#);
        assert_eq!(
            Expression::match_root("test").at_any_set_value().to_string(),
            "test[Value(*)]"
        );
        assert_eq!(Expression::match_root("a").at_parent().at_name("b").to_string(), "a.<.b");
    }

    #[test]
    fn test_parent_path() {
        let p = Path::root("a").at_list_index(2);
        assert_eq!(p.parent_path(), Path::root("a"));
        assert_eq!(p.last_step(), Some(&PathStep::ElementKeyInt(2)));
        assert_eq!(Path::empty().parent_path(), Path::empty());
    }

    #[test]
    fn test_resolve_collapses_parent_steps() {
        let e = Expression::match_root("test1").at_parent().at_name("test2");
        assert_eq!(e.resolve(), Expression::match_root("test2"));
    }

    #[test]
    fn test_merge() {
        let base = Expression::match_root("test1");
        let rel = Expression::match_relative().at_name("test2");
        assert_eq!(base.merge(&rel), Expression::match_root("test1").at_name("test2"));

        let rooted = Expression::match_root("other");
        assert_eq!(base.merge(&rooted), rooted);
    }

    #[test]
    fn test_matches() {
        let e = Expression::match_root("test").at_any_list_index().at_name("x");
        assert!(e.matches(&Path::root("test").at_list_index(3).at_name("x")));
        assert!(!e.matches(&Path::root("test").at_list_index(3)));
        assert!(!e.matches(&Path::root("test").at_map_key("3").at_name("x")));

        let e = Expression::match_root("s").at_set_value(Value::string("a"));
        assert!(e.matches(&Path::root("s").at_set_value(Value::string("a"))));
        assert!(!e.matches(&Path::root("s").at_set_value(Value::string("b"))));

        assert!(!Expression::default().matches(&Path::empty()));
    }

    #[test]
    fn test_matches_parent() {
        assert!(Expression::match_root("test").matches_parent(&Path::empty()));
        assert!(!Expression::default().matches_parent(&Path::empty()));
        assert!(!Expression::match_root("test").matches_parent(&Path::root("test")));

        let e = Expression::match_root("test1").at_any_list_index().at_name("test2");
        assert!(e.matches_parent(&Path::root("test1").at_list_index(0)));
        assert!(!e.matches_parent(&Path::root("test2").at_list_index(0)));

        let e = Expression::match_root("test1")
            .at_name("test2")
            .at_parent()
            .at_name("test3")
            .at_name("test4");
        assert!(e.matches_parent(&Path::root("test1").at_name("test3")));
    }

    #[test]
    fn test_path_expression_is_exact() {
        let p = Path::root("a").at_list_index(1).at_set_value(Value::null(Type::String));
        assert!(p.expression().matches(&p));
        assert!(!p.expression().matches(&p.parent_path()));
    }
}
