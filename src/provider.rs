//! Traits that provider authors implement.
//!
//! A [`Provider`] names its resource and data source types. Each
//! [`ResourceType`] / [`DataSourceType`] declares a schema and builds the
//! [`Resource`] / [`DataSource`] that serves one request. Optional phases
//! (config validators, imperative config validation, plan modification,
//! state upgrades, provider metadata) are capabilities: an implementation
//! opts in by returning itself from the matching `as_*` accessor. The
//! server logs them as [`ResourceCapabilities`],
//! [`DataSourceCapabilities`] and [`ProviderCapabilities`].
//!
//! Callbacks receive owned request data and fill in a response, which comes
//! pre-populated with sensible defaults (for example the planned state on
//! create).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::data::{Config, Plan, State};
use crate::diag::Diagnostics;
use crate::path::Path;
use crate::schema::Schema;
use crate::upgrade::ResourceStateUpgrader;
use crate::validation::ConfigValidator;

// =========================================================================
// Provider
// =========================================================================

/// Resource types of a provider, by type name.
pub type ResourceTypes<P> = BTreeMap<String, Arc<dyn ResourceType<P>>>;

/// Data source types of a provider, by type name.
pub type DataSourceTypes<P> = BTreeMap<String, Arc<dyn DataSourceType<P>>>;

/// A provider: its configuration schema and the types it serves.
#[async_trait]
pub trait Provider: Send + Sync + Sized + 'static {
    /// Schema of the provider configuration block.
    fn schema(&self, ctx: &Context) -> (Schema, Diagnostics);

    /// Configure the provider, typically building API clients.
    async fn configure(
        &self,
        ctx: &Context,
        req: ConfigureProviderRequest,
        resp: &mut ConfigureProviderResponse,
    );

    /// Resource types by type name.
    fn resources(&self, ctx: &Context) -> (ResourceTypes<Self>, Diagnostics);

    /// Data source types by type name.
    fn data_sources(&self, ctx: &Context) -> (DataSourceTypes<Self>, Diagnostics);

    /// Declarative validators for the provider configuration.
    fn as_config_validators(&self) -> Option<&dyn ProviderWithConfigValidators> {
        None
    }

    /// Imperative validation of the provider configuration.
    fn as_validate_config(&self) -> Option<&dyn ProviderWithValidateConfig> {
        None
    }

    /// Provider metadata threaded into resource and data source requests.
    fn as_provider_meta(&self) -> Option<&dyn ProviderWithMetaSchema> {
        None
    }
}

/// Input to [`Provider::configure`].
#[derive(Debug, Clone)]
pub struct ConfigureProviderRequest {
    /// Version of the host driving the provider.
    pub terraform_version: String,
    /// The provider configuration.
    pub config: Config,
}

/// Output of [`Provider::configure`].
#[derive(Debug, Clone, Default)]
pub struct ConfigureProviderResponse {
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Declarative provider configuration validators.
pub trait ProviderWithConfigValidators: Send + Sync {
    /// The validators, run in order.
    fn config_validators(&self, ctx: &Context) -> Vec<Arc<dyn ConfigValidator>>;
}

/// Imperative provider configuration validation.
#[async_trait]
pub trait ProviderWithValidateConfig: Send + Sync {
    /// Validate the configuration.
    async fn validate_config(
        &self,
        ctx: &Context,
        req: ValidateConfigRequest,
        resp: &mut ValidateConfigResponse,
    );
}

/// Declares a schema for the `provider_meta` block.
pub trait ProviderWithMetaSchema: Send + Sync {
    /// Schema of the metadata.
    fn meta_schema(&self, ctx: &Context) -> (Schema, Diagnostics);
}

/// Input to the validate-config capabilities of providers, resources and
/// data sources.
#[derive(Debug, Clone)]
pub struct ValidateConfigRequest {
    /// The configuration. Values may be unknown.
    pub config: Config,
}

/// Output of the validate-config capabilities.
#[derive(Debug, Clone, Default)]
pub struct ValidateConfigResponse {
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

// =========================================================================
// Resources
// =========================================================================

/// Declares a resource type and builds its instances.
pub trait ResourceType<P>: Send + Sync {
    /// Schema of the resource.
    fn schema(&self, ctx: &Context) -> (Schema, Diagnostics);

    /// Build a resource serving one request.
    fn new_resource(&self, ctx: &Context, provider: &Arc<P>) -> (Box<dyn Resource>, Diagnostics);
}

/// Lifecycle of a managed resource.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Create the resource. The response state starts as the plan.
    async fn create(
        &self,
        ctx: &Context,
        req: CreateResourceRequest,
        resp: &mut CreateResourceResponse,
    );

    /// Refresh the resource. The response state starts as the current
    /// state; call [`State::remove_resource`] when it no longer exists.
    async fn read(&self, ctx: &Context, req: ReadResourceRequest, resp: &mut ReadResourceResponse);

    /// Update the resource in place. The response state starts as the plan.
    async fn update(
        &self,
        ctx: &Context,
        req: UpdateResourceRequest,
        resp: &mut UpdateResourceResponse,
    );

    /// Delete the resource. On success the state is removed whatever the
    /// response holds.
    async fn delete(
        &self,
        ctx: &Context,
        req: DeleteResourceRequest,
        resp: &mut DeleteResourceResponse,
    );

    /// Declarative configuration validators.
    fn as_config_validators(&self) -> Option<&dyn ResourceWithConfigValidators> {
        None
    }

    /// Imperative configuration validation.
    fn as_validate_config(&self) -> Option<&dyn ResourceWithValidateConfig> {
        None
    }

    /// Resource-level plan modification.
    fn as_modify_plan(&self) -> Option<&dyn ResourceWithModifyPlan> {
        None
    }

    /// State upgrades from prior schema versions.
    fn as_upgrade_state(&self) -> Option<&dyn ResourceWithUpgradeState> {
        None
    }
}

/// Declarative resource configuration validators.
pub trait ResourceWithConfigValidators: Send + Sync {
    /// The validators, run in order.
    fn config_validators(&self, ctx: &Context) -> Vec<Arc<dyn ConfigValidator>>;
}

/// Imperative resource configuration validation.
#[async_trait]
pub trait ResourceWithValidateConfig: Send + Sync {
    /// Validate the configuration.
    async fn validate_config(
        &self,
        ctx: &Context,
        req: ValidateConfigRequest,
        resp: &mut ValidateConfigResponse,
    );
}

/// Resource-level plan modification, run after attribute plan modifiers.
#[async_trait]
pub trait ResourceWithModifyPlan: Send + Sync {
    /// Adjust the plan or flag attributes as requiring replacement.
    async fn modify_plan(
        &self,
        ctx: &Context,
        req: ModifyResourcePlanRequest,
        resp: &mut ModifyResourcePlanResponse,
    );
}

/// State upgraders keyed by the prior schema version they handle.
pub trait ResourceWithUpgradeState: Send + Sync {
    /// The upgraders. Versions start at 0.
    fn upgrade_state(&self, ctx: &Context) -> BTreeMap<i64, ResourceStateUpgrader>;
}

/// Input to [`Resource::create`].
#[derive(Debug, Clone)]
pub struct CreateResourceRequest {
    /// The configuration.
    pub config: Config,
    /// The planned state.
    pub plan: Plan,
    /// Provider metadata, when the provider declares a meta schema.
    pub provider_meta: Option<Config>,
}

/// Output of [`Resource::create`].
#[derive(Debug, Clone)]
pub struct CreateResourceResponse {
    /// The new state.
    pub state: State,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Input to [`Resource::read`].
#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    /// The current state.
    pub state: State,
    /// Opaque private data stored alongside the state.
    pub private: Vec<u8>,
    /// Provider metadata, when the provider declares a meta schema.
    pub provider_meta: Option<Config>,
}

/// Output of [`Resource::read`].
#[derive(Debug, Clone)]
pub struct ReadResourceResponse {
    /// The refreshed state.
    pub state: State,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Input to [`Resource::update`].
#[derive(Debug, Clone)]
pub struct UpdateResourceRequest {
    /// The configuration.
    pub config: Config,
    /// The planned state.
    pub plan: Plan,
    /// The prior state.
    pub state: State,
    /// Provider metadata, when the provider declares a meta schema.
    pub provider_meta: Option<Config>,
}

/// Output of [`Resource::update`].
#[derive(Debug, Clone)]
pub struct UpdateResourceResponse {
    /// The new state.
    pub state: State,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Input to [`Resource::delete`].
#[derive(Debug, Clone)]
pub struct DeleteResourceRequest {
    /// The prior state.
    pub state: State,
    /// Provider metadata, when the provider declares a meta schema.
    pub provider_meta: Option<Config>,
}

/// Output of [`Resource::delete`].
#[derive(Debug, Clone)]
pub struct DeleteResourceResponse {
    /// Ignored on success; the state is always removed.
    pub state: State,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Input to [`ResourceWithModifyPlan::modify_plan`].
#[derive(Debug, Clone)]
pub struct ModifyResourcePlanRequest {
    /// The configuration.
    pub config: Config,
    /// The prior state. Null when creating.
    pub state: State,
    /// The plan after attribute plan modifiers ran.
    pub plan: Plan,
    /// Provider metadata, when the provider declares a meta schema.
    pub provider_meta: Option<Config>,
}

/// Output of [`ResourceWithModifyPlan::modify_plan`].
#[derive(Debug, Clone)]
pub struct ModifyResourcePlanResponse {
    /// The plan to return. Starts as the request plan.
    pub plan: Plan,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<Path>,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Which optional phases a resource takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCapabilities {
    /// Declares config validators.
    pub config_validators: bool,
    /// Validates its config imperatively.
    pub validate_config: bool,
    /// Modifies plans.
    pub modify_plan: bool,
    /// Upgrades state.
    pub upgrade_state: bool,
}

impl ResourceCapabilities {
    /// Detect the capabilities of `resource`.
    pub fn of(resource: &dyn Resource) -> Self {
        Self {
            config_validators: resource.as_config_validators().is_some(),
            validate_config: resource.as_validate_config().is_some(),
            modify_plan: resource.as_modify_plan().is_some(),
            upgrade_state: resource.as_upgrade_state().is_some(),
        }
    }
}

// =========================================================================
// Data Sources
// =========================================================================

/// Declares a data source type and builds its instances.
pub trait DataSourceType<P>: Send + Sync {
    /// Schema of the data source.
    fn schema(&self, ctx: &Context) -> (Schema, Diagnostics);

    /// Build a data source serving one request.
    fn new_data_source(
        &self,
        ctx: &Context,
        provider: &Arc<P>,
    ) -> (Box<dyn DataSource>, Diagnostics);
}

/// A read-only data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Read the data. The response state starts as the configuration.
    async fn read(
        &self,
        ctx: &Context,
        req: ReadDataSourceRequest,
        resp: &mut ReadDataSourceResponse,
    );

    /// Declarative configuration validators.
    fn as_config_validators(&self) -> Option<&dyn DataSourceWithConfigValidators> {
        None
    }

    /// Imperative configuration validation.
    fn as_validate_config(&self) -> Option<&dyn DataSourceWithValidateConfig> {
        None
    }
}

/// Declarative data source configuration validators.
pub trait DataSourceWithConfigValidators: Send + Sync {
    /// The validators, run in order.
    fn config_validators(&self, ctx: &Context) -> Vec<Arc<dyn ConfigValidator>>;
}

/// Imperative data source configuration validation.
#[async_trait]
pub trait DataSourceWithValidateConfig: Send + Sync {
    /// Validate the configuration.
    async fn validate_config(
        &self,
        ctx: &Context,
        req: ValidateConfigRequest,
        resp: &mut ValidateConfigResponse,
    );
}

/// Input to [`DataSource::read`].
#[derive(Debug, Clone)]
pub struct ReadDataSourceRequest {
    /// The configuration.
    pub config: Config,
    /// Provider metadata, when the provider declares a meta schema.
    pub provider_meta: Option<Config>,
}

/// Output of [`DataSource::read`].
#[derive(Debug, Clone)]
pub struct ReadDataSourceResponse {
    /// The data read.
    pub state: State,
    /// Diagnostics to report.
    pub diagnostics: Diagnostics,
}

/// Which optional phases a data source takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataSourceCapabilities {
    /// Declares config validators.
    pub config_validators: bool,
    /// Validates its config imperatively.
    pub validate_config: bool,
}

impl DataSourceCapabilities {
    /// Detect the capabilities of `data_source`.
    pub fn of(data_source: &dyn DataSource) -> Self {
        Self {
            config_validators: data_source.as_config_validators().is_some(),
            validate_config: data_source.as_validate_config().is_some(),
        }
    }
}

/// Which optional phases a provider takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Declares config validators.
    pub config_validators: bool,
    /// Validates its config imperatively.
    pub validate_config: bool,
    /// Declares a provider_meta schema.
    pub provider_meta: bool,
}

impl ProviderCapabilities {
    /// Detect the capabilities of `provider`.
    pub fn of<P: Provider>(provider: &P) -> Self {
        Self {
            config_validators: provider.as_config_validators().is_some(),
            validate_config: provider.as_validate_config().is_some(),
            provider_meta: provider.as_provider_meta().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    #[async_trait]
    impl Resource for Plain {
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

    struct Versioned;

    #[async_trait]
    impl Resource for Versioned {
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

        fn as_upgrade_state(&self) -> Option<&dyn ResourceWithUpgradeState> {
            Some(self)
        }
    }

    #[async_trait]
    impl ResourceWithModifyPlan for Versioned {
        async fn modify_plan(
            &self,
            _ctx: &Context,
            _req: ModifyResourcePlanRequest,
            _resp: &mut ModifyResourcePlanResponse,
        ) {
        }
    }

    impl ResourceWithUpgradeState for Versioned {
        fn upgrade_state(&self, _ctx: &Context) -> BTreeMap<i64, ResourceStateUpgrader> {
            BTreeMap::new()
        }
    }

    struct Lookup;

    #[async_trait]
    impl DataSource for Lookup {
        async fn read(
            &self,
            _ctx: &Context,
            _req: ReadDataSourceRequest,
            _resp: &mut ReadDataSourceResponse,
        ) {
        }

        fn as_validate_config(&self) -> Option<&dyn DataSourceWithValidateConfig> {
            Some(self)
        }
    }

    #[async_trait]
    impl DataSourceWithValidateConfig for Lookup {
        async fn validate_config(
            &self,
            _ctx: &Context,
            _req: ValidateConfigRequest,
            _resp: &mut ValidateConfigResponse,
        ) {
        }
    }

    #[test]
    fn test_resource_capabilities() {
        assert_eq!(ResourceCapabilities::of(&Plain), ResourceCapabilities::default());
        assert_eq!(
            ResourceCapabilities::of(&Versioned),
            ResourceCapabilities {
                config_validators: false,
                validate_config: false,
                modify_plan: true,
                upgrade_state: true,
            }
        );
    }

    #[test]
    fn test_data_source_capabilities() {
        let caps = DataSourceCapabilities::of(&Lookup);
        assert!(caps.validate_config);
        assert!(!caps.config_validators);
    }
}
