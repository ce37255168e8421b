//! Attribute plan modifiers.
//!
//! A plan modifier may rewrite the planned value of the attribute (or
//! block) it is declared on, or flag the attribute as requiring the
//! resource to be replaced. [`modify_attribute_plans`] runs every declared
//! modifier across a schema, descending into nested attributes and blocks.
//!
//! A [`TypePlanModifier`] works at the level of a value type instead: it
//! sees the attribute's value and every element nested inside it, and runs
//! before the attribute's own modifiers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::data::{Config, Plan, State};
use crate::diag::Diagnostics;
use crate::error::SchemaError;
use crate::path::Path;
use crate::schema::{Attribute, AttributeKind, Block, NestedBlock, NestingMode};
use crate::value::{Type, Value};

/// Modifies the planned value of a single attribute.
///
/// Modifiers of one attribute run in declaration order, each seeing the
/// value left by the previous one. An error diagnostic stops the remaining
/// modifiers of the attribute and everything nested below it; siblings still
/// run so that all problems are reported.
pub trait AttributePlanModifier: Send + Sync {
    /// Plain text description of what the modifier does.
    fn description(&self) -> String;

    /// Markdown description of what the modifier does.
    fn markdown_description(&self) -> String {
        self.description()
    }

    /// Inspect the request and update the response.
    fn modify(&self, req: &ModifyAttributePlanRequest<'_>, resp: &mut ModifyAttributePlanResponse);
}

/// Input to an [`AttributePlanModifier`].
#[derive(Debug)]
pub struct ModifyAttributePlanRequest<'a> {
    /// Path of the attribute.
    pub path: Path,
    /// The attribute's config value.
    pub config_value: Value,
    /// The attribute's prior state value. Null when creating.
    pub state_value: Value,
    /// The attribute's planned value as left by earlier modifiers.
    pub plan_value: Value,
    /// The whole resource configuration.
    pub config: &'a Config,
    /// The whole prior state.
    pub state: &'a State,
    /// The whole plan as it was when modification started.
    pub plan: &'a Plan,
    /// Provider metadata configured for the module, if any.
    pub provider_meta: Option<&'a Config>,
}

/// Output of an [`AttributePlanModifier`].
#[derive(Debug, Clone)]
pub struct ModifyAttributePlanResponse {
    /// The planned value to use. Starts as the request's plan value.
    pub plan_value: Value,
    /// Whether a change to the attribute forces replacement.
    pub requires_replace: bool,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Modifies planned values of a type wherever they occur in an attribute.
///
/// The modifier runs once for every value reachable inside the attribute,
/// innermost first, ending with the attribute's value itself. Set elements
/// are not visited because they cannot be matched to prior state; the set
/// as a whole still is.
pub trait TypePlanModifier: Send + Sync {
    /// Plain text description of what the modifier does.
    fn description(&self) -> String;

    /// Inspect the request and update the response.
    fn modify(&self, req: &ModifyTypePlanRequest, resp: &mut ModifyTypePlanResponse);
}

/// Input to a [`TypePlanModifier`].
#[derive(Debug, Clone)]
pub struct ModifyTypePlanRequest {
    /// Path of the value.
    pub path: Path,
    /// The prior state value at the path. Null when absent.
    pub state_value: Value,
    /// The planned value at the path, with nested values already modified.
    pub plan_value: Value,
}

/// Output of a [`TypePlanModifier`].
#[derive(Debug, Clone)]
pub struct ModifyTypePlanResponse {
    /// The planned value to use. Starts as the request's plan value.
    pub plan_value: Value,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Marks an attribute as forcing replacement whenever its planned value
/// differs from state.
///
/// No replacement is requested when creating or destroying the resource, or
/// when a computed attribute has no configured value (the provider is then
/// free to change it in place).
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiresReplace;

impl AttributePlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "If the value of this attribute changes, Terraform will destroy and recreate the resource."
            .to_string()
    }

    fn modify(&self, req: &ModifyAttributePlanRequest<'_>, resp: &mut ModifyAttributePlanResponse) {
        if is_replaceable_change(req, &mut resp.diagnostics) {
            resp.requires_replace = true;
        }
    }
}

/// Condition evaluated by [`RequiresReplaceIf`] with the attribute's state
/// value, config value and path.
pub type RequiresReplaceIfFn = dyn Fn(&Value, &Value, &Path) -> (bool, Diagnostics) + Send + Sync;

/// Like [`RequiresReplace`] but only when a condition holds.
///
/// A false condition never clears a replacement requested by an earlier
/// modifier.
#[derive(Clone)]
pub struct RequiresReplaceIf {
    condition: Arc<RequiresReplaceIfFn>,
    description: String,
    markdown_description: String,
}

impl RequiresReplaceIf {
    /// Create the modifier from a condition and its descriptions.
    pub fn new<F>(
        condition: F,
        description: impl Into<String>,
        markdown_description: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Value, &Value, &Path) -> (bool, Diagnostics) + Send + Sync + 'static,
    {
        Self {
            condition: Arc::new(condition),
            description: description.into(),
            markdown_description: markdown_description.into(),
        }
    }
}

impl fmt::Debug for RequiresReplaceIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequiresReplaceIf")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl AttributePlanModifier for RequiresReplaceIf {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn markdown_description(&self) -> String {
        self.markdown_description.clone()
    }

    fn modify(&self, req: &ModifyAttributePlanRequest<'_>, resp: &mut ModifyAttributePlanResponse) {
        if !is_replaceable_change(req, &mut resp.diagnostics) {
            return;
        }

        let (replace, diags) = (self.condition)(&req.state_value, &req.config_value, &req.path);
        resp.diagnostics.append(diags);

        if replace {
            resp.requires_replace = true;
        } else if resp.requires_replace {
            tracing::debug!(
                attribute_path = %req.path,
                "Keeping previous attribute replacement requirement"
            );
        }
    }
}

/// Keeps the prior state value for an attribute that would otherwise be
/// planned as unknown.
///
/// Applies only when state holds a value and the configured value is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseStateForUnknown;

impl AttributePlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "Once set, the value of this attribute in state will not change.".to_string()
    }

    fn modify(&self, req: &ModifyAttributePlanRequest<'_>, resp: &mut ModifyAttributePlanResponse) {
        if req.state_value.is_null()
            || resp.plan_value.is_known()
            || req.config_value.is_unknown()
        {
            return;
        }
        resp.plan_value = req.state_value.clone();
    }
}

/// Shared preconditions of the replacement modifiers.
fn is_replaceable_change(
    req: &ModifyAttributePlanRequest<'_>,
    diagnostics: &mut Diagnostics,
) -> bool {
    // creating or destroying never needs a replacement
    if req.state.raw.is_null() || req.plan.raw.is_null() {
        return false;
    }

    // blocks cannot be computed
    let computed = match req.state.schema.attribute_at_path(&req.path) {
        Ok(attr) => attr.flags.computed,
        Err(SchemaError::PathIsBlock) => false,
        Err(err) => {
            diagnostics.add_attribute_error(
                req.path.clone(),
                "Error finding attribute schema",
                format!(
                    "An unexpected error was encountered retrieving the schema for this attribute. \
                     This is always a bug in the provider.\n\nError: {}",
                    err
                ),
            );
            return false;
        }
    };

    if req.config_value.is_null() && computed {
        return false;
    }

    req.plan_value != req.state_value
}

/// Result of [`modify_attribute_plans`].
#[derive(Debug, Clone)]
pub struct AttributePlanOutcome {
    /// The plan with every modifier applied.
    pub plan: Plan,
    /// Paths flagged as forcing replacement, in visit order.
    pub requires_replace: Vec<Path>,
    /// Diagnostics from modifiers and from writing values back.
    pub diagnostics: Diagnostics,
}

/// Run every attribute and block plan modifier declared in the plan's
/// schema.
///
/// A null plan (resource destruction) is returned untouched.
pub fn modify_attribute_plans(
    config: &Config,
    state: &State,
    plan: &Plan,
    provider_meta: Option<&Config>,
) -> AttributePlanOutcome {
    let mut walker = Walker {
        config,
        state,
        plan,
        provider_meta,
        out: plan.clone(),
        requires_replace: Vec::new(),
        diagnostics: Diagnostics::new(),
    };

    if !plan.raw.is_null() && plan.raw.is_known() {
        let root = Path::empty();
        walker.modify_object(
            Object::Block(&plan.schema.block),
            plan.raw.clone(),
            &|_| root.clone(),
        );
    }

    AttributePlanOutcome {
        plan: walker.out,
        requires_replace: walker.requires_replace,
        diagnostics: walker.diagnostics,
    }
}

/// The schema of one object: either a block or the attributes of a nested
/// attribute element.
#[derive(Clone, Copy)]
enum Object<'s> {
    Block(&'s Block),
    Attributes(&'s BTreeMap<String, Attribute>),
}

impl<'s> Object<'s> {
    fn attributes(self) -> &'s BTreeMap<String, Attribute> {
        match self {
            Object::Block(block) => &block.attributes,
            Object::Attributes(attributes) => attributes,
        }
    }

    fn blocks(self) -> Option<&'s BTreeMap<String, NestedBlock>> {
        match self {
            Object::Block(block) => Some(&block.blocks),
            Object::Attributes(_) => None,
        }
    }
}

struct Walker<'a> {
    config: &'a Config,
    state: &'a State,
    plan: &'a Plan,
    provider_meta: Option<&'a Config>,
    out: Plan,
    requires_replace: Vec<Path>,
    diagnostics: Diagnostics,
}

impl Walker<'_> {
    /// Visit the attributes and blocks of the object `current`. `locate`
    /// yields the object's path from its current value, since set elements
    /// are addressed by value and move as their children change.
    fn modify_object(
        &mut self,
        object: Object<'_>,
        mut current: Value,
        locate: &dyn Fn(&Value) -> Path,
    ) -> Value {
        if current.is_null() || current.is_unknown() {
            return current;
        }

        for (name, attr) in object.attributes() {
            let path = locate(&current).at_name(name.clone());
            if let Some(value) = self.modify_attribute(attr, &path) {
                self.update_child(&mut current, name, value, &path);
            }
        }

        for (name, nested) in object.blocks().into_iter().flatten() {
            let path = locate(&current).at_name(name.clone());
            if let Some(value) = self.modify_nested_block(nested, &path) {
                self.update_child(&mut current, name, value, &path);
            }
        }

        current
    }

    fn update_child(&mut self, current: &mut Value, name: &str, value: Value, path: &Path) {
        if let Err(err) = current.set_at_path(&Path::root(name), value) {
            self.diagnostics.add_attribute_error(
                path.clone(),
                "Attribute Plan Modification Error",
                format!("An unexpected error was encountered tracking the modified plan: {}", err),
            );
        }
    }

    /// Returns the attribute's final planned value, or `None` when
    /// modification stopped with an error.
    fn modify_attribute(&mut self, attr: &Attribute, path: &Path) -> Option<Value> {
        if !attr.type_plan_modifiers.is_empty() {
            self.run_type_modifiers(&attr.type_plan_modifiers, path)?;
        }
        let value = self.run_modifiers(&attr.plan_modifiers, path)?;
        match &attr.kind {
            AttributeKind::Typed(_) => Some(value),
            AttributeKind::Nested(nested) => Some(self.modify_elements(
                Object::Attributes(&nested.attributes),
                nested.nesting_mode,
                path,
                value,
            )),
        }
    }

    fn modify_nested_block(&mut self, nested: &NestedBlock, path: &Path) -> Option<Value> {
        let value = self.run_modifiers(&nested.plan_modifiers, path)?;
        Some(self.modify_elements(Object::Block(&nested.block), nested.nesting_mode, path, value))
    }

    fn modify_elements(
        &mut self,
        object: Object<'_>,
        mode: NestingMode,
        path: &Path,
        value: Value,
    ) -> Value {
        if value.is_null() || value.is_unknown() {
            return value;
        }
        let element_type = value.ty().element_type().cloned();

        match (mode, element_type) {
            (NestingMode::Single, _) => self.modify_object(object, value, &|_| path.clone()),
            (NestingMode::List, Some(element_type)) => {
                let elements = value.elements().map(<[Value]>::to_vec).unwrap_or_default();
                let mut out = Vec::with_capacity(elements.len());
                for (i, element) in elements.into_iter().enumerate() {
                    let element_path = path.at_list_index(i as i64);
                    out.push(self.modify_object(object, element, &|_| element_path.clone()));
                }
                Value::list(element_type, out)
            }
            (NestingMode::Set, Some(element_type)) => {
                let elements = value.elements().map(<[Value]>::to_vec).unwrap_or_default();
                let mut out = Vec::with_capacity(elements.len());
                for element in elements {
                    let locate = |current: &Value| path.at_set_value(current.clone());
                    out.push(self.modify_object(object, element, &locate));
                }
                Value::set(element_type, out)
            }
            (NestingMode::Map, Some(element_type)) => {
                let entries = value.entries().cloned().unwrap_or_default();
                let mut out = BTreeMap::new();
                for (key, element) in entries {
                    let element_path = path.at_map_key(key.clone());
                    let modified = self.modify_object(object, element, &|_| element_path.clone());
                    out.insert(key, modified);
                }
                Value::map(element_type, out)
            }
            (_, None) => value,
        }
    }

    /// Run type-level `modifiers` across the value at `path` and write the
    /// result into the output plan.
    fn run_type_modifiers(
        &mut self,
        modifiers: &[Arc<dyn TypePlanModifier>],
        path: &Path,
    ) -> Option<()> {
        let found = (self.out.value_at_path(path), self.state.value_at_path(path));
        let (plan_value, state_value) = match found {
            (Ok(plan_value), Ok(state_value)) => (plan_value, state_value),
            (plan_value, state_value) => {
                self.diagnostics.extend(plan_value.err().into_iter().flatten());
                self.diagnostics.extend(state_value.err().into_iter().flatten());
                return None;
            }
        };

        let modified = self.modify_type_value(modifiers, path, &state_value, plan_value.clone())?;
        if modified.ty() != plan_value.ty() {
            self.diagnostics.add_attribute_error(
                path.clone(),
                "Type Plan Modification Error",
                format!(
                    "A type plan modifier returned a value of type {}, but the attribute has type \
                     {}. This is always a bug in the provider.",
                    modified.ty(),
                    plan_value.ty()
                ),
            );
            return None;
        }

        if modified != plan_value {
            let diags = self.out.set_attribute_value(path, modified);
            let failed = diags.has_error();
            self.diagnostics.append(diags);
            if failed {
                return None;
            }
        }
        Some(())
    }

    fn modify_type_value(
        &mut self,
        modifiers: &[Arc<dyn TypePlanModifier>],
        path: &Path,
        state: &Value,
        plan: Value,
    ) -> Option<Value> {
        let plan = if plan.is_known() && !plan.is_null() {
            self.modify_type_children(modifiers, path, state, plan)?
        } else {
            plan
        };

        let mut resp = ModifyTypePlanResponse {
            plan_value: plan,
            diagnostics: Diagnostics::new(),
        };
        for modifier in modifiers {
            let req = ModifyTypePlanRequest {
                path: path.clone(),
                state_value: state.clone(),
                plan_value: resp.plan_value.clone(),
            };
            tracing::debug!(
                attribute_path = %path,
                description = %modifier.description(),
                "Calling provider defined TypePlanModifier"
            );
            modifier.modify(&req, &mut resp);
            tracing::debug!(attribute_path = %path, "Called provider defined TypePlanModifier");

            if resp.diagnostics.has_error() {
                break;
            }
        }

        let failed = resp.diagnostics.has_error();
        self.diagnostics.append(resp.diagnostics);
        if failed {
            return None;
        }
        Some(resp.plan_value)
    }

    fn modify_type_children(
        &mut self,
        modifiers: &[Arc<dyn TypePlanModifier>],
        path: &Path,
        state: &Value,
        plan: Value,
    ) -> Option<Value> {
        let ty = plan.ty().clone();
        match &ty {
            Type::Object(_) => {
                let mut out = BTreeMap::new();
                for (name, element) in plan.entries().cloned().unwrap_or_default() {
                    let prior = state_child(state.attribute(&name), &element);
                    let element_path = path.at_name(name.clone());
                    let next = self.modify_type_value(modifiers, &element_path, &prior, element)?;
                    out.insert(name, next);
                }
                Some(Value::object(out))
            }
            Type::Map(element_type) => {
                let mut out = BTreeMap::new();
                for (key, element) in plan.entries().cloned().unwrap_or_default() {
                    let prior = state_child(state.entries().and_then(|e| e.get(&key)), &element);
                    let element_path = path.at_map_key(key.clone());
                    let next = self.modify_type_value(modifiers, &element_path, &prior, element)?;
                    out.insert(key, next);
                }
                Some(Value::map(element_type.as_ref().clone(), out))
            }
            Type::List(_) | Type::Tuple(_) => {
                let elements = plan.elements().map(<[Value]>::to_vec).unwrap_or_default();
                let mut out = Vec::with_capacity(elements.len());
                for (i, element) in elements.into_iter().enumerate() {
                    let prior = state_child(state.elements().and_then(|e| e.get(i)), &element);
                    let element_path = path.at_list_index(i as i64);
                    out.push(self.modify_type_value(modifiers, &element_path, &prior, element)?);
                }
                match &ty {
                    Type::List(element_type) => {
                        Some(Value::list(element_type.as_ref().clone(), out))
                    }
                    _ => Some(Value::tuple(out)),
                }
            }
            _ => Some(plan),
        }
    }

    /// Run `modifiers` for the value at `path` and write the result into the
    /// output plan.
    fn run_modifiers(
        &mut self,
        modifiers: &[Arc<dyn AttributePlanModifier>],
        path: &Path,
    ) -> Option<Value> {
        let plan_value = match self.out.value_at_path(path) {
            Ok(value) => value,
            Err(diags) => {
                self.diagnostics.append(diags);
                return None;
            }
        };
        if modifiers.is_empty() {
            return Some(plan_value);
        }

        let found = (self.config.value_at_path(path), self.state.value_at_path(path));
        let (config_value, state_value) = match found {
            (Ok(config_value), Ok(state_value)) => (config_value, state_value),
            (config_value, state_value) => {
                self.diagnostics.extend(config_value.err().into_iter().flatten());
                self.diagnostics.extend(state_value.err().into_iter().flatten());
                return None;
            }
        };

        let mut resp = ModifyAttributePlanResponse {
            plan_value: plan_value.clone(),
            requires_replace: false,
            diagnostics: Diagnostics::new(),
        };

        for modifier in modifiers {
            let req = ModifyAttributePlanRequest {
                path: path.clone(),
                config_value: config_value.clone(),
                state_value: state_value.clone(),
                plan_value: resp.plan_value.clone(),
                config: self.config,
                state: self.state,
                plan: self.plan,
                provider_meta: self.provider_meta,
            };
            tracing::debug!(
                attribute_path = %path,
                description = %modifier.description(),
                "Calling provider defined AttributePlanModifier"
            );
            modifier.modify(&req, &mut resp);
            tracing::debug!(
                attribute_path = %path,
                "Called provider defined AttributePlanModifier"
            );

            if resp.diagnostics.has_error() {
                break;
            }
        }

        let failed = resp.diagnostics.has_error();
        self.diagnostics.append(resp.diagnostics);
        if failed {
            return None;
        }

        if resp.requires_replace {
            self.requires_replace.push(path.clone());
        }

        if resp.plan_value.ty() != plan_value.ty() {
            self.diagnostics.add_attribute_error(
                path.clone(),
                "Attribute Plan Modification Error",
                format!(
                    "A plan modifier returned a value of type {}, but the attribute has type {}. \
                     This is always a bug in the provider.",
                    resp.plan_value.ty(),
                    plan_value.ty()
                ),
            );
            return None;
        }

        if resp.plan_value != plan_value {
            let diags = self.out.set_attribute_value(path, resp.plan_value.clone());
            let failed = diags.has_error();
            self.diagnostics.append(diags);
            if failed {
                return None;
            }
        }

        Some(resp.plan_value)
    }
}

/// The prior state counterpart of `plan`, or null of the same type.
fn state_child(prior: Option<&Value>, plan: &Value) -> Value {
    prior.cloned().unwrap_or_else(|| Value::null(plan.ty().clone()))
}
