//! Testing utilities for provider implementations.
//!
//! [`ProviderTester`] drives a [`Provider`] through the same
//! [`ProviderServer`] handlers the host talks to, taking and returning plain
//! JSON so tests read like the configuration they exercise.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_framework::testing::ProviderTester;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_server() {
//!     let tester = ProviderTester::new(MyProvider::default());
//!     tester.configure(json!({"endpoint": "https://api.test"})).await.unwrap();
//!
//!     let state = tester
//!         .lifecycle_create("example_server", json!({"name": "web"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["name"], "web");
//! }
//! ```

use serde_json::{Map, Value as Json};

use crate::codec::{DynamicValue, RawState};
use crate::context::Context;
use crate::diag::{Diagnostic, Diagnostics};
use crate::error::{CodecError, ValueError};
use crate::path::Path;
use crate::protocol;
use crate::provider::Provider;
use crate::reflect::{value_from_json, value_to_json};
use crate::schema::Schema;
use crate::server::ProviderServer;
use crate::value::Value;

/// Host version reported to the provider by [`ProviderTester::configure`].
pub const TEST_TERRAFORM_VERSION: &str = "1.5.0";

/// A test harness for provider implementations.
pub struct ProviderTester<P: Provider> {
    server: ProviderServer<P>,
    ctx: Context,
}

impl<P: Provider> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            server: ProviderServer::new(provider),
            ctx: Context::new(),
        }
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        self.server.provider()
    }

    /// The server the tester drives.
    pub fn server(&self) -> &ProviderServer<P> {
        &self.server
    }

    /// The context every request runs under. Cancelling it cancels them.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Fetch every schema the provider serves.
    pub async fn schema(&self) -> Result<protocol::GetProviderSchemaResponse, TestError> {
        let resp = self
            .server
            .get_provider_schema(&self.ctx, protocol::GetProviderSchemaRequest)
            .await;
        check_diagnostics(&resp.diagnostics)?;
        Ok(resp)
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider().resources(&self.ctx).0.into_keys().collect()
    }

    /// Data source type names, sorted.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider().data_sources(&self.ctx).0.into_keys().collect()
    }

    /// The declared schema of a resource type.
    pub fn resource_schema(&self, type_name: &str) -> Result<Schema, TestError> {
        let (types, diags) = self.provider().resources(&self.ctx);
        check_diagnostics(&diags)?;
        let resource_type = types.get(type_name).ok_or_else(|| {
            not_found(
                "Resource not found",
                format!("No resource named {:?} is configured on the provider", type_name),
            )
        })?;
        let (schema, diags) = resource_type.schema(&self.ctx);
        check_diagnostics(&diags)?;
        Ok(schema)
    }

    /// The declared schema of a data source type.
    pub fn data_source_schema(&self, type_name: &str) -> Result<Schema, TestError> {
        let (types, diags) = self.provider().data_sources(&self.ctx);
        check_diagnostics(&diags)?;
        let data_source_type = types.get(type_name).ok_or_else(|| {
            not_found(
                "Data Source not found",
                format!("No data source named {:?} is configured on the provider", type_name),
            )
        })?;
        let (schema, diags) = data_source_type.schema(&self.ctx);
        check_diagnostics(&diags)?;
        Ok(schema)
    }

    fn provider_schema(&self) -> Result<Schema, TestError> {
        let (schema, diags) = self.provider().schema(&self.ctx);
        check_diagnostics(&diags)?;
        Ok(schema)
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration. Warnings are returned on success.
    pub async fn validate_provider_config(&self, config: Json) -> Result<Diagnostics, TestError> {
        let config = to_dynamic(&self.provider_schema()?, &config)?;
        let resp = self
            .server
            .validate_provider_config(&self.ctx, protocol::ValidateProviderConfigRequest { config })
            .await;
        check_diagnostics(&resp.diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Json) -> Result<Diagnostics, TestError> {
        let config = to_dynamic(&self.provider_schema()?, &config)?;
        let resp = self
            .server
            .configure_provider(
                &self.ctx,
                protocol::ConfigureProviderRequest {
                    terraform_version: TEST_TERRAFORM_VERSION.to_string(),
                    config,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)
    }

    /// Stop the provider, cancelling in-flight requests.
    pub async fn stop(&self) {
        self.server.stop_provider(&self.ctx, protocol::StopProviderRequest).await;
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        type_name: &str,
        config: Json,
    ) -> Result<Diagnostics, TestError> {
        let config = to_dynamic(&self.resource_schema(type_name)?, &config)?;
        let resp = self
            .server
            .validate_resource_config(
                &self.ctx,
                protocol::ValidateResourceConfigRequest {
                    type_name: type_name.to_string(),
                    config,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)
    }

    /// Plan creating a resource from `config`.
    pub async fn plan_create(
        &self,
        type_name: &str,
        config: Json,
    ) -> Result<PlanResult, TestError> {
        self.plan(type_name, None, config).await
    }

    /// Plan moving `prior_state` to `config`.
    pub async fn plan_update(
        &self,
        type_name: &str,
        prior_state: Json,
        config: Json,
    ) -> Result<PlanResult, TestError> {
        self.plan(type_name, Some(prior_state), config).await
    }

    /// Plan destroying a resource.
    pub async fn plan_delete(
        &self,
        type_name: &str,
        prior_state: Json,
    ) -> Result<PlanResult, TestError> {
        self.plan(type_name, Some(prior_state), Json::Null).await
    }

    /// Full plan operation. The proposed new state is built the way the host
    /// builds it: the configuration, with unset computed attributes carried
    /// over from the prior state.
    pub async fn plan(
        &self,
        type_name: &str,
        prior_state: Option<Json>,
        config: Json,
    ) -> Result<PlanResult, TestError> {
        let schema = self.resource_schema(type_name)?;
        let prior_state = prior_state.unwrap_or(Json::Null);
        let proposed = propose_new_state(&schema, &prior_state, &config);
        let resp = self
            .server
            .plan_resource_change(
                &self.ctx,
                protocol::PlanResourceChangeRequest {
                    type_name: type_name.to_string(),
                    prior_state: to_dynamic(&schema, &prior_state)?,
                    proposed_new_state: to_dynamic(&schema, &proposed)?,
                    config: to_dynamic(&schema, &config)?,
                    prior_private: Vec::new(),
                    provider_meta: None,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)?;

        let planned = resp.planned_state.ok_or(TestError::MissingValue("planned state"))?;
        Ok(PlanResult {
            planned_state: planned.decode(&schema.terraform_type())?,
            requires_replace: resp.requires_replace,
            diagnostics: resp.diagnostics,
        })
    }

    /// Apply a plan. Returns the new state, `null` after a delete.
    pub async fn apply(
        &self,
        type_name: &str,
        prior_state: Option<Json>,
        plan: &PlanResult,
        config: Json,
    ) -> Result<Json, TestError> {
        let schema = self.resource_schema(type_name)?;
        let resp = self
            .server
            .apply_resource_change(
                &self.ctx,
                protocol::ApplyResourceChangeRequest {
                    type_name: type_name.to_string(),
                    prior_state: to_dynamic(&schema, &prior_state.unwrap_or(Json::Null))?,
                    planned_state: DynamicValue::encode(&plan.planned_state)?,
                    config: to_dynamic(&schema, &config)?,
                    planned_private: Vec::new(),
                    provider_meta: None,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)?;
        from_dynamic(&schema, resp.new_state, "new state")
    }

    /// Read the current state of a resource. `null` means it is gone.
    pub async fn read(&self, type_name: &str, current_state: Json) -> Result<Json, TestError> {
        let schema = self.resource_schema(type_name)?;
        let resp = self
            .server
            .read_resource(
                &self.ctx,
                protocol::ReadResourceRequest {
                    type_name: type_name.to_string(),
                    current_state: to_dynamic(&schema, &current_state)?,
                    private: Vec::new(),
                    provider_meta: None,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)?;
        from_dynamic(&schema, resp.new_state, "new state")
    }

    /// Upgrade state stored at `version` to the current schema.
    pub async fn upgrade_resource_state(
        &self,
        type_name: &str,
        version: i64,
        state: Json,
    ) -> Result<Json, TestError> {
        let schema = self.resource_schema(type_name)?;
        let resp = self
            .server
            .upgrade_resource_state(
                &self.ctx,
                protocol::UpgradeResourceStateRequest {
                    type_name: type_name.to_string(),
                    version,
                    raw_state: Some(RawState::from_json(state.to_string())),
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)?;
        from_dynamic(&schema, resp.upgraded_state, "upgraded state")
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        type_name: &str,
        config: Json,
    ) -> Result<Diagnostics, TestError> {
        let config = to_dynamic(&self.data_source_schema(type_name)?, &config)?;
        let resp = self
            .server
            .validate_data_source_config(
                &self.ctx,
                protocol::ValidateDataSourceConfigRequest {
                    type_name: type_name.to_string(),
                    config,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)
    }

    /// Read a data source.
    pub async fn read_data_source(&self, type_name: &str, config: Json) -> Result<Json, TestError> {
        let schema = self.data_source_schema(type_name)?;
        let resp = self
            .server
            .read_data_source(
                &self.ctx,
                protocol::ReadDataSourceRequest {
                    type_name: type_name.to_string(),
                    config: to_dynamic(&schema, &config)?,
                    provider_meta: None,
                },
            )
            .await;
        check_diagnostics(&resp.diagnostics)?;
        from_dynamic(&schema, resp.state, "state")
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan, apply, read.
    pub async fn lifecycle_create(&self, type_name: &str, config: Json) -> Result<Json, TestError> {
        let plan = self.plan_create(type_name, config.clone()).await?;
        let created = self.apply(type_name, None, &plan, config).await?;
        self.read(type_name, created).await
    }

    /// Run a full update lifecycle: plan, apply, read.
    pub async fn lifecycle_update(
        &self,
        type_name: &str,
        prior_state: Json,
        config: Json,
    ) -> Result<Json, TestError> {
        let plan = self.plan_update(type_name, prior_state.clone(), config.clone()).await?;
        let updated = self.apply(type_name, Some(prior_state), &plan, config).await?;
        self.read(type_name, updated).await
    }

    /// Run a full delete lifecycle: plan, apply.
    pub async fn lifecycle_delete(
        &self,
        type_name: &str,
        current_state: Json,
    ) -> Result<(), TestError> {
        let plan = self.plan_delete(type_name, current_state.clone()).await?;
        let state = self.apply(type_name, Some(current_state), &plan, Json::Null).await?;
        if state.is_null() {
            Ok(())
        } else {
            Err(TestError::MissingValue("null state after delete"))
        }
    }

    /// Run create, update and delete in turn. Returns the state after the
    /// update.
    pub async fn lifecycle_crud(
        &self,
        type_name: &str,
        initial_config: Json,
        updated_config: Json,
    ) -> Result<Json, TestError> {
        let created = self.lifecycle_create(type_name, initial_config).await?;
        let updated = self.lifecycle_update(type_name, created, updated_config).await?;
        self.lifecycle_delete(type_name, updated.clone()).await?;
        Ok(updated)
    }
}

/// The outcome of a plan.
#[derive(Debug, Clone)]
pub struct PlanResult {
    /// The planned state. May hold unknown values.
    pub planned_state: Value,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<Path>,
    /// Warnings raised while planning.
    pub diagnostics: Diagnostics,
}

impl PlanResult {
    /// A top-level attribute of the planned state.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.planned_state.attribute(name)
    }

    /// The planned state as JSON. Fails while any value is unknown.
    pub fn planned_json(&self) -> Result<Json, TestError> {
        Ok(value_to_json(&self.planned_state)?)
    }
}

/// Error type for tester operations.
#[derive(Debug)]
pub enum TestError {
    /// The operation reported error diagnostics.
    Diagnostics(Diagnostics),
    /// A JSON input did not fit the schema.
    Value(ValueError),
    /// A wire value could not be encoded or decoded.
    Codec(CodecError),
    /// A response lacked a value it should carry.
    MissingValue(&'static str),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags.iter() {
                    write!(f, "  [{}] {}", diag.severity, diag.summary)?;
                    if !diag.detail.is_empty() {
                        write!(f, ": {}", diag.detail)?;
                    }
                    if let Some(path) = &diag.path {
                        write!(f, " (at {})", path)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Value(e) => write!(f, "Invalid value: {}", e),
            TestError::Codec(e) => write!(f, "Codec error: {}", e),
            TestError::MissingValue(what) => write!(f, "Response is missing the {}", what),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ValueError> for TestError {
    fn from(e: ValueError) -> Self {
        TestError::Value(e)
    }
}

impl From<CodecError> for TestError {
    fn from(e: CodecError) -> Self {
        TestError::Codec(e)
    }
}

/// Fail on error diagnostics, passing warnings through.
fn check_diagnostics(diagnostics: &Diagnostics) -> Result<Diagnostics, TestError> {
    if diagnostics.has_error() {
        Err(TestError::Diagnostics(diagnostics.clone()))
    } else {
        Ok(diagnostics.clone())
    }
}

fn not_found(summary: &str, detail: String) -> TestError {
    let mut diagnostics = Diagnostics::new();
    diagnostics.add_error(summary, detail);
    TestError::Diagnostics(diagnostics)
}

fn to_dynamic(schema: &Schema, json: &Json) -> Result<DynamicValue, TestError> {
    let value = value_from_json(&schema.terraform_type(), json, &Path::empty())?;
    Ok(DynamicValue::encode(&value)?)
}

fn from_dynamic(
    schema: &Schema,
    value: Option<DynamicValue>,
    what: &'static str,
) -> Result<Json, TestError> {
    let value = value.ok_or(TestError::MissingValue(what))?;
    Ok(value_to_json(&value.decode(&schema.terraform_type())?)?)
}

fn propose_new_state(schema: &Schema, prior: &Json, config: &Json) -> Json {
    let (Json::Object(prior), Json::Object(config)) = (prior, config) else {
        return config.clone();
    };
    let mut proposed = Map::new();
    for (name, attribute) in &schema.block.attributes {
        let configured = config.get(name).cloned().unwrap_or(Json::Null);
        let value = if configured.is_null() && attribute.flags.computed {
            prior.get(name).cloned().unwrap_or(Json::Null)
        } else {
            configured
        };
        proposed.insert(name.clone(), value);
    }
    for name in schema.block.blocks.keys() {
        proposed.insert(name.clone(), config.get(name).cloned().unwrap_or(Json::Null));
    }
    Json::Object(proposed)
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates or updates the resource rather than
/// destroying it.
///
/// # Panics
///
/// Panics if the planned state is null.
pub fn assert_plan_keeps_resource(plan: &PlanResult) {
    assert!(
        !plan.planned_state.is_null(),
        "Expected a planned state, but the plan destroys the resource"
    );
}

/// Assert that a plan destroys the resource.
///
/// # Panics
///
/// Panics if the planned state is not null.
pub fn assert_plan_destroys(plan: &PlanResult) {
    assert!(plan.planned_state.is_null(), "Expected the plan to destroy the resource");
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if no attribute requires replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        !plan.requires_replace.is_empty(),
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if any attribute requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        plan.requires_replace.is_empty(),
        "Expected plan to update in place, but {:?} require replacement",
        plan.requires_replace.iter().map(|p| p.to_string()).collect::<Vec<_>>()
    );
}

/// Assert that changing `path` forces replacement.
///
/// # Panics
///
/// Panics if `path` is not among the replacement paths.
pub fn assert_plan_requires_replace_of(plan: &PlanResult, path: &Path) {
    assert!(
        plan.requires_replace.contains(path),
        "Expected '{}' to require replacement. Replacement paths: {:?}",
        path,
        plan.requires_replace.iter().map(|p| p.to_string()).collect::<Vec<_>>()
    );
}

/// Assert that a top-level attribute is unknown until apply.
///
/// # Panics
///
/// Panics if the attribute is absent or known.
pub fn assert_attribute_unknown(plan: &PlanResult, name: &str) {
    let unknown = plan.attribute(name).is_some_and(Value::is_unknown);
    assert!(unknown, "Expected attribute '{}' to be unknown in the plan", name);
}

/// Assert that a top-level attribute is known in the plan.
///
/// # Panics
///
/// Panics if the attribute is absent or unknown.
pub fn assert_attribute_known(plan: &PlanResult, name: &str) {
    let known = plan.attribute(name).is_some_and(Value::is_known);
    assert!(known, "Expected attribute '{}' to be known in the plan", name);
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &Diagnostics) {
    let errors: Vec<&Diagnostic> = diagnostics.errors().collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &Diagnostics) {
    assert!(diagnostics.has_error(), "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error whose summary contains
/// `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &Diagnostics, substring: &str) {
    assert!(
        diagnostics.errors().any(|d| d.summary.contains(substring)),
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics.errors().map(|d| &d.summary).collect::<Vec<_>>()
    );
}
