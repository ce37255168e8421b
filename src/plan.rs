//! Plan modification for one resource change.
//!
//! [`plan_resource_change`] sequences the phases that turn the host's
//! proposed new state into the planned state:
//!
//! 1. attribute plan modifiers;
//! 2. marking computed attributes without configuration as unknown, unless
//!    the change is a delete or a no-op;
//! 3. attribute plan modifiers again, so they can replace those unknowns,
//!    unless the change is a delete;
//! 4. the resource's own `modify_plan`, unless the change is a delete.
//!
//! Paths flagged as requiring replacement are collected from every phase and
//! normalized once at the end.

use tracing::{debug, trace};

use crate::context::Context;
use crate::data::{Config, Plan, State};
use crate::diag::Diagnostics;
use crate::error::SchemaError;
use crate::path::Path;
use crate::plan_modifier::modify_attribute_plans;
use crate::provider::{ModifyResourcePlanRequest, ModifyResourcePlanResponse, Resource};
use crate::schema::Schema;
use crate::value::Value;

/// Replace the null value of every computed attribute that has no
/// configured value with an unknown of the same type.
///
/// Elements of typed attributes and blocks have no attribute schema of
/// their own and are left alone. Any other lookup failure is fatal.
pub fn mark_computed_nils_as_unknown(
    config: &Value,
    schema: &Schema,
    plan: Value,
) -> Result<Value, SchemaError> {
    plan.transform(&mut |path: &Path, value: Value| {
        // the whole resource is never marked
        if path.is_empty() {
            return Ok(value);
        }

        if config.at_path(path).is_ok_and(|configured| !configured.is_null()) {
            trace!(attribute_path = %path, "attribute not null in config, not marking unknown");
            return Ok(value);
        }

        let attribute = match schema.attribute_at_path(path) {
            Ok(attribute) => attribute,
            Err(SchemaError::PathInsideAtomicAttribute) => {
                trace!(
                    attribute_path = %path,
                    "attribute is a non-schema attribute, not marking unknown"
                );
                return Ok(value);
            }
            Err(SchemaError::PathIsBlock) => {
                trace!(attribute_path = %path, "path is a block, not marking unknown");
                return Ok(value);
            }
            Err(err) => {
                tracing::error!(
                    attribute_path = %path,
                    "couldn't find attribute in resource schema"
                );
                return Err(err);
            }
        };

        if !attribute.flags.computed {
            trace!(
                attribute_path = %path,
                "attribute is not computed in schema, not marking unknown"
            );
            return Ok(value);
        }

        debug!(
            attribute_path = %path,
            "marking computed attribute that is null in the config as unknown"
        );
        Ok(Value::unknown(value.ty().clone()))
    })
}

/// Sort `paths` by their rendering and drop duplicates.
pub fn normalize_requires_replace(mut paths: Vec<Path>) -> Vec<Path> {
    if paths.len() < 2 {
        return paths;
    }

    paths.sort_by_cached_key(|path| path.to_string());
    paths.dedup_by(|current, previous| {
        let duplicate = current == previous;
        if duplicate {
            debug!(
                attribute_path = %current,
                "attribute found multiple times in RequiresReplace, removing duplicate"
            );
        }
        duplicate
    });
    paths
}

/// The planned change for one resource.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// The planned new state.
    pub plan: Plan,
    /// Sorted, de-duplicated paths whose change forces replacement.
    pub requires_replace: Vec<Path>,
    /// Diagnostics from every phase.
    pub diagnostics: Diagnostics,
}

/// Run every plan phase for a proposed change. See the module docs for the
/// order. Stops at the first phase that reports an error.
pub async fn plan_resource_change(
    ctx: &Context,
    resource: &dyn Resource,
    config: &Config,
    state: &State,
    proposed: Plan,
    provider_meta: Option<&Config>,
) -> PlannedChange {
    let mut change = PlannedChange {
        plan: proposed,
        requires_replace: Vec::new(),
        diagnostics: Diagnostics::new(),
    };

    if !change.plan.raw.is_null() {
        run_attribute_modifiers(config, state, provider_meta, &mut change);
        if change.diagnostics.has_error() {
            return change;
        }
    }

    if !change.plan.raw.is_null() && change.plan.raw != state.raw {
        trace!("marking computed null values as unknown");
        let plan = change.plan.raw.clone();
        match mark_computed_nils_as_unknown(&config.raw, &change.plan.schema, plan) {
            Ok(marked) => {
                if marked != change.plan.raw {
                    trace!("at least one value was changed to unknown");
                }
                change.plan.raw = marked;
            }
            Err(err) => {
                change.diagnostics.add_error(
                    "Error modifying plan",
                    format!(
                        "There was an unexpected error updating the plan. This is always a problem \
                         with the provider. Please report the following to the provider \
                         developer:\n\ncouldn't find attribute in resource schema: {}",
                        err
                    ),
                );
                return change;
            }
        }
    }

    if !change.plan.raw.is_null() {
        run_attribute_modifiers(config, state, provider_meta, &mut change);
        if change.diagnostics.has_error() {
            return change;
        }
    }

    if let Some(modifier) = resource.as_modify_plan() {
        if !change.plan.raw.is_null() {
            trace!("Resource implements ResourceWithModifyPlan");
            let req = ModifyResourcePlanRequest {
                config: config.clone(),
                state: state.clone(),
                plan: change.plan.clone(),
                provider_meta: provider_meta.cloned(),
            };
            let mut resp = ModifyResourcePlanResponse {
                plan: change.plan.clone(),
                requires_replace: Vec::new(),
                diagnostics: Diagnostics::new(),
            };
            debug!("Calling provider defined Resource ModifyPlan");
            modifier.modify_plan(ctx, req, &mut resp).await;
            debug!("Called provider defined Resource ModifyPlan");

            change.plan = resp.plan;
            change.requires_replace.extend(resp.requires_replace);
            change.diagnostics.append(resp.diagnostics);
        }
    }

    change.requires_replace =
        normalize_requires_replace(std::mem::take(&mut change.requires_replace));
    change
}

fn run_attribute_modifiers(
    config: &Config,
    state: &State,
    provider_meta: Option<&Config>,
    change: &mut PlannedChange,
) {
    let outcome = modify_attribute_plans(config, state, &change.plan, provider_meta);
    change.plan = outcome.plan;
    change.requires_replace.extend(outcome.requires_replace);
    change.diagnostics.append(outcome.diagnostics);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::plan_modifier::{
        AttributePlanModifier, ModifyAttributePlanRequest, ModifyAttributePlanResponse,
        UseStateForUnknown,
    };
    use crate::provider::{
        CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest,
        DeleteResourceResponse, ReadResourceRequest, ReadResourceResponse, ResourceWithModifyPlan,
        UpdateResourceRequest, UpdateResourceResponse,
    };
    use crate::schema::{
        Attribute, AttributeFlags, AttributeType, Block, NestedAttributes, NestedBlock,
    };
    use crate::value::Type;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("label", Attribute::optional_string())
    }

    fn state_of(schema: &Schema, json: serde_json::Value) -> State {
        let mut state = State::null(schema.clone());
        assert!(!state.set(&json).has_error());
        state
    }

    fn config_of(schema: &Schema, json: serde_json::Value) -> Config {
        let mut config = Config::null(schema.clone());
        assert!(!config.set(&json).has_error());
        config
    }

    fn plan_of(schema: &Schema, json: serde_json::Value) -> Plan {
        let mut plan = Plan::null(schema.clone());
        assert!(!plan.set(&json).has_error());
        plan
    }

    #[test]
    fn test_mark_computed_nils_as_unknown() {
        let schema = schema();
        let config = config_of(&schema, json!({"label": null}));
        let plan = plan_of(&schema, json!({"id": null, "label": null}));

        let marked = mark_computed_nils_as_unknown(&config.raw, &schema, plan.raw).unwrap();
        assert!(marked.attribute("id").unwrap().is_unknown());
        assert_eq!(marked.attribute("id").unwrap().ty(), &Type::String);
        assert!(marked.attribute("label").unwrap().is_null());
    }

    #[test]
    fn test_mark_keeps_configured_computed_values() {
        let schema = Schema::v0().with_attribute(
            "zone",
            Attribute::new(AttributeType::String, AttributeFlags::optional_computed()),
        );
        let config = config_of(&schema, json!({"zone": "a"}));
        let plan = plan_of(&schema, json!({"zone": "a"}));
        let marked = mark_computed_nils_as_unknown(&config.raw, &schema, plan.raw.clone()).unwrap();
        assert_eq!(marked, plan.raw);
    }

    #[test]
    fn test_mark_skips_elements_of_typed_attributes() {
        let schema = Schema::v0().with_attribute(
            "tags",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::optional_computed(),
            ),
        );
        let config = config_of(&schema, json!({"tags": ["a", null]}));
        let plan = plan_of(&schema, json!({"tags": ["a", null]}));
        let marked = mark_computed_nils_as_unknown(&config.raw, &schema, plan.raw.clone()).unwrap();
        assert_eq!(marked, plan.raw);
    }

    #[test]
    fn test_mark_replaces_whole_unconfigured_computed_collections() {
        let schema = Schema::v0().with_attribute(
            "tags",
            Attribute::new(AttributeType::list(AttributeType::String), AttributeFlags::computed()),
        );
        let config = Config::null(schema.clone());
        let plan = plan_of(&schema, json!({"tags": ["a"]}));
        let marked = mark_computed_nils_as_unknown(&config.raw, &schema, plan.raw).unwrap();
        let tags = marked.attribute("tags").unwrap();
        assert!(tags.is_unknown());
        assert_eq!(tags.ty(), &Type::list(Type::String));
    }

    #[test]
    fn test_mark_descends_into_nested_attributes_and_blocks() {
        let schema = Schema::v0()
            .with_attribute(
                "endpoint",
                Attribute::nested(
                    NestedAttributes::single(BTreeMap::from([
                        ("host".to_string(), Attribute::optional_string()),
                        ("address".to_string(), Attribute::computed_string()),
                    ])),
                    AttributeFlags::optional(),
                ),
            )
            .with_block(
                "disk",
                NestedBlock::list(
                    Block::new().with_attribute("serial", Attribute::computed_string()),
                ),
            );
        let config = config_of(&schema, json!({"endpoint": {"host": "h"}, "disk": [{}]}));
        let plan = plan_of(&schema, json!({"endpoint": {"host": "h"}, "disk": [{}]}));

        let marked = mark_computed_nils_as_unknown(&config.raw, &schema, plan.raw).unwrap();
        let endpoint = marked.attribute("endpoint").unwrap();
        assert!(endpoint.attribute("address").unwrap().is_unknown());
        assert_eq!(endpoint.attribute("host"), Some(&Value::string("h")));
        let disk = marked.attribute("disk").unwrap().elements().unwrap();
        assert!(disk[0].attribute("serial").unwrap().is_unknown());
    }

    #[test]
    fn test_normalize_requires_replace() {
        let paths = vec![
            Path::root("b"),
            Path::root("a").at_list_index(1),
            Path::root("b"),
            Path::root("a").at_list_index(1),
            Path::root("a"),
        ];
        let normalized = normalize_requires_replace(paths);
        assert_eq!(
            normalized,
            vec![Path::root("a"), Path::root("a").at_list_index(1), Path::root("b")]
        );
        assert_eq!(normalize_requires_replace(normalized.clone()), normalized);
    }

    #[test]
    fn test_normalize_requires_replace_short_inputs() {
        assert!(normalize_requires_replace(Vec::new()).is_empty());
        assert_eq!(normalize_requires_replace(vec![Path::root("x")]), vec![Path::root("x")]);
    }

    struct Noop;

    #[async_trait]
    impl Resource for Noop {
        async fn create(
            &self,
            _ctx: &Context,
            _req: CreateResourceRequest,
            _resp: &mut CreateResourceResponse,
        ) {
        }
        async fn read(
            &self,
            _ctx: &Context,
            _req: ReadResourceRequest,
            _resp: &mut ReadResourceResponse,
        ) {
        }
        async fn update(
            &self,
            _ctx: &Context,
            _req: UpdateResourceRequest,
            _resp: &mut UpdateResourceResponse,
        ) {
        }
        async fn delete(
            &self,
            _ctx: &Context,
            _req: DeleteResourceRequest,
            _resp: &mut DeleteResourceResponse,
        ) {
        }
    }

    /// Sets `id` and forces replacement of `label`.
    struct Pinned;

    #[async_trait]
    impl Resource for Pinned {
        async fn create(
            &self,
            _ctx: &Context,
            _req: CreateResourceRequest,
            _resp: &mut CreateResourceResponse,
        ) {
        }
        async fn read(
            &self,
            _ctx: &Context,
            _req: ReadResourceRequest,
            _resp: &mut ReadResourceResponse,
        ) {
        }
        async fn update(
            &self,
            _ctx: &Context,
            _req: UpdateResourceRequest,
            _resp: &mut UpdateResourceResponse,
        ) {
        }
        async fn delete(
            &self,
            _ctx: &Context,
            _req: DeleteResourceRequest,
            _resp: &mut DeleteResourceResponse,
        ) {
        }

        fn as_modify_plan(&self) -> Option<&dyn ResourceWithModifyPlan> {
            Some(self)
        }
    }

    #[async_trait]
    impl ResourceWithModifyPlan for Pinned {
        async fn modify_plan(
            &self,
            _ctx: &Context,
            _req: ModifyResourcePlanRequest,
            resp: &mut ModifyResourcePlanResponse,
        ) {
            let diags = resp.plan.set_attribute(&Path::root("id"), "pinned");
            resp.diagnostics.append(diags);
            resp.requires_replace.push(Path::root("label"));
            resp.requires_replace.push(Path::root("label"));
        }
    }

    #[tokio::test]
    async fn test_plan_marks_unknown_on_update() {
        let schema = schema();
        let config = config_of(&schema, json!({"label": null}));
        let state = state_of(&schema, json!({"id": "abc", "label": "old"}));
        let proposed = plan_of(&schema, json!({"id": null, "label": null}));

        let change =
            plan_resource_change(&Context::new(), &Noop, &config, &state, proposed, None).await;
        assert!(change.diagnostics.is_empty());
        assert!(change.plan.raw.attribute("id").unwrap().is_unknown());
        assert!(change.plan.raw.attribute("label").unwrap().is_null());
    }

    #[tokio::test]
    async fn test_plan_noop_keeps_values() {
        let schema = schema();
        let config = config_of(&schema, json!({"label": "same"}));
        let state = state_of(&schema, json!({"id": "abc", "label": "same"}));
        let proposed = plan_of(&schema, json!({"id": "abc", "label": "same"}));

        let change = plan_resource_change(
            &Context::new(),
            &Noop,
            &config,
            &state,
            proposed.clone(),
            None,
        )
        .await;
        assert_eq!(change.plan.raw, proposed.raw);
    }

    #[tokio::test]
    async fn test_plan_delete_skips_resource_modifier() {
        let schema = schema();
        let config = Config::null(schema.clone());
        let state = state_of(&schema, json!({"id": "abc", "label": "x"}));
        let proposed = Plan::null(schema.clone());

        let change =
            plan_resource_change(&Context::new(), &Pinned, &config, &state, proposed, None).await;
        assert!(change.plan.raw.is_null());
        assert!(change.requires_replace.is_empty());
    }

    #[tokio::test]
    async fn test_plan_resource_modifier_runs_last() {
        let schema = schema();
        let config = config_of(&schema, json!({"label": "new"}));
        let state = state_of(&schema, json!({"id": "abc", "label": "old"}));
        let proposed = plan_of(&schema, json!({"id": "abc", "label": "new"}));

        let change =
            plan_resource_change(&Context::new(), &Pinned, &config, &state, proposed, None).await;
        assert!(change.diagnostics.is_empty(), "{:?}", change.diagnostics);
        assert_eq!(change.plan.raw.attribute("id"), Some(&Value::string("pinned")));
        assert_eq!(change.requires_replace, vec![Path::root("label")]);
    }

    #[tokio::test]
    async fn test_plan_attribute_modifiers_override_unknown() {
        let schema = Schema::v0()
            .with_attribute(
                "id",
                Attribute::computed_string().with_plan_modifier(UseStateForUnknown),
            )
            .with_attribute("label", Attribute::optional_string());
        let config = config_of(&schema, json!({"label": "new"}));
        let state = state_of(&schema, json!({"id": "abc", "label": "old"}));
        let proposed = plan_of(&schema, json!({"id": null, "label": "new"}));

        let change =
            plan_resource_change(&Context::new(), &Noop, &config, &state, proposed, None).await;
        assert!(change.diagnostics.is_empty());
        assert_eq!(change.plan.raw.attribute("id"), Some(&Value::string("abc")));
    }

    struct Counting(Arc<AtomicUsize>);

    impl AttributePlanModifier for Counting {
        fn description(&self) -> String {
            "counts invocations".to_string()
        }

        fn modify(
            &self,
            _req: &ModifyAttributePlanRequest<'_>,
            _resp: &mut ModifyAttributePlanResponse,
        ) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_plan_second_attribute_pass_runs_on_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = Schema::v0().with_attribute(
            "label",
            Attribute::optional_string().with_plan_modifier(Counting(calls.clone())),
        );
        let config = config_of(&schema, json!({"label": "same"}));
        let state = state_of(&schema, json!({"label": "same"}));
        let proposed = plan_of(&schema, json!({"label": "same"}));

        let change =
            plan_resource_change(&Context::new(), &Noop, &config, &state, proposed, None).await;
        assert!(change.diagnostics.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = Arc::new(AtomicUsize::new(0));
        let schema = Schema::v0().with_attribute(
            "label",
            Attribute::optional_string().with_plan_modifier(Counting(calls.clone())),
        );
        let state = state_of(&schema, json!({"label": "same"}));
        let change = plan_resource_change(
            &Context::new(),
            &Noop,
            &Config::null(schema.clone()),
            &state,
            Plan::null(schema.clone()),
            None,
        )
        .await;
        assert!(change.plan.raw.is_null());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
