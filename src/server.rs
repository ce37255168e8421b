//! The RPC orchestrator.
//!
//! [`ProviderServer`] implements every provider protocol operation on top of
//! a [`Provider`]. Each handler resolves the type it addresses, decodes the
//! wire values against the declared schema, runs the framework phases and
//! the provider's callbacks in order, and encodes the result. Failures never
//! surface as Rust errors: they are returned as diagnostics on the response.
//!
//! The transport that frames requests is external. It calls the handlers
//! below with the inbound [`Context`] and sends back whatever they return.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_framework::{context::Context, protocol, server::ProviderServer};
//!
//! let server = ProviderServer::new(MyProvider::default());
//! let resp = server
//!     .get_provider_schema(&Context::new(), protocol::GetProviderSchemaRequest)
//!     .await;
//! assert!(!resp.diagnostics.has_error());
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, instrument, trace, warn, Span};

use crate::codec::DynamicValue;
use crate::context::{CancellationRegistry, Context};
use crate::data::{Config, Plan, State};
use crate::diag::Diagnostics;
use crate::logging::{KEY_DATA_SOURCE_TYPE, KEY_RESOURCE_TYPE};
use crate::plan::plan_resource_change;
use crate::protocol::{self, SchemaDescriptor};
use crate::provider::{
    CreateResourceRequest, CreateResourceResponse, DataSource, DataSourceCapabilities,
    DeleteResourceRequest, DeleteResourceResponse, Provider, ProviderCapabilities,
    ReadDataSourceRequest, ReadDataSourceResponse, ReadResourceRequest, ReadResourceResponse,
    Resource, ResourceCapabilities, ResourceType, UpdateResourceRequest, UpdateResourceResponse,
    ValidateConfigRequest, ValidateConfigResponse,
};
use crate::schema::Schema;
use crate::upgrade::{pass_through, run_upgrader};
use crate::validation::ConfigValidator;
use crate::value::Value;

const SCHEMA_CONVERSION_DETAIL: &str =
    "couldn't be converted into a usable type. This is always a problem with the provider. \
     Please report the following to the provider developer:\n\n";

/// Serves the provider protocol for one provider.
pub struct ProviderServer<P: Provider> {
    provider: Arc<P>,
    cancellations: CancellationRegistry,
}

impl<P: Provider> ProviderServer<P> {
    /// Serve `provider`.
    pub fn new(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    /// Serve a provider that is shared with other owners.
    pub fn from_arc(provider: Arc<P>) -> Self {
        Self {
            provider,
            cancellations: CancellationRegistry::new(),
        }
    }

    /// The served provider.
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Number of invocations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.cancellations.len()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    fn provider_schema(&self, ctx: &Context, diagnostics: &mut Diagnostics) -> Option<Schema> {
        debug!("Calling provider defined Provider GetSchema");
        let (schema, diags) = self.provider.schema(ctx);
        debug!("Called provider defined Provider GetSchema");
        diagnostics.append(diags);
        (!diagnostics.has_error()).then_some(schema)
    }

    fn resource_type(
        &self,
        ctx: &Context,
        type_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<Arc<dyn ResourceType<P>>> {
        Span::current().record(KEY_RESOURCE_TYPE, type_name);
        debug!("Calling provider defined Provider GetResources");
        let (mut types, diags) = self.provider.resources(ctx);
        debug!("Called provider defined Provider GetResources");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return None;
        }
        let found = types.remove(type_name);
        if found.is_none() {
            diagnostics.add_error(
                "Resource not found",
                format!("No resource named {:?} is configured on the provider", type_name),
            );
        }
        found
    }

    fn resource_schema(
        &self,
        ctx: &Context,
        resource_type: &dyn ResourceType<P>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Schema> {
        debug!("Calling provider defined ResourceType GetSchema");
        let (schema, diags) = resource_type.schema(ctx);
        debug!("Called provider defined ResourceType GetSchema");
        diagnostics.append(diags);
        (!diagnostics.has_error()).then_some(schema)
    }

    fn new_resource(
        &self,
        ctx: &Context,
        resource_type: &dyn ResourceType<P>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Box<dyn Resource>> {
        debug!("Calling provider defined ResourceType NewResource");
        let (resource, diags) = resource_type.new_resource(ctx, &self.provider);
        debug!("Called provider defined ResourceType NewResource");
        diagnostics.append(diags);
        (!diagnostics.has_error()).then_some(resource)
    }

    /// Resolve, describe and instantiate a resource type.
    fn resource(
        &self,
        ctx: &Context,
        type_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<(Schema, Box<dyn Resource>)> {
        let resource_type = self.resource_type(ctx, type_name, diagnostics)?;
        let schema = self.resource_schema(ctx, resource_type.as_ref(), diagnostics)?;
        let resource = self.new_resource(ctx, resource_type.as_ref(), diagnostics)?;
        trace!(capabilities = ?ResourceCapabilities::of(resource.as_ref()), "Resolved resource");
        Some((schema, resource))
    }

    fn data_source(
        &self,
        ctx: &Context,
        type_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<(Schema, Box<dyn DataSource>)> {
        Span::current().record(KEY_DATA_SOURCE_TYPE, type_name);
        debug!("Calling provider defined Provider GetDataSources");
        let (mut types, diags) = self.provider.data_sources(ctx);
        debug!("Called provider defined Provider GetDataSources");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return None;
        }
        let Some(data_source_type) = types.remove(type_name) else {
            diagnostics.add_error(
                "Data Source not found",
                format!("No data source named {:?} is configured on the provider", type_name),
            );
            return None;
        };

        debug!("Calling provider defined DataSourceType GetSchema");
        let (schema, diags) = data_source_type.schema(ctx);
        debug!("Called provider defined DataSourceType GetSchema");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return None;
        }

        debug!("Calling provider defined DataSourceType NewDataSource");
        let (data_source, diags) = data_source_type.new_data_source(ctx, &self.provider);
        debug!("Called provider defined DataSourceType NewDataSource");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return None;
        }
        trace!(
            capabilities = ?DataSourceCapabilities::of(data_source.as_ref()),
            "Resolved data source"
        );
        Some((schema, data_source))
    }

    /// The provider meta value for a request, when the provider declares a
    /// meta schema. An absent value decodes to a typed null.
    fn provider_meta(
        &self,
        ctx: &Context,
        raw: Option<&DynamicValue>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Config> {
        let meta = self.provider.as_provider_meta()?;
        trace!("Provider implements ProviderWithMetaSchema");
        debug!("Calling provider defined Provider GetMetaSchema");
        let (schema, diags) = meta.meta_schema(ctx);
        debug!("Called provider defined Provider GetMetaSchema");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return None;
        }

        let Some(raw) = raw else {
            return Some(Config::null(schema));
        };
        let value = decode(
            raw,
            &schema,
            "Error parsing provider_meta",
            "There was an error parsing the provider_meta block. Please report this to the \
             provider developer:",
            diagnostics,
        )?;
        Some(Config::new(schema, value))
    }

    // =========================================================================
    // Provider RPCs
    // =========================================================================

    /// Serve the provider, provider meta, resource and data source schemas.
    #[instrument(skip_all, name = "rpc.get_provider_schema")]
    pub async fn get_provider_schema(
        &self,
        ctx: &Context,
        _req: protocol::GetProviderSchemaRequest,
    ) -> protocol::GetProviderSchemaResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::GetProviderSchemaResponse::default();
        let diagnostics = &mut resp.diagnostics;
        trace!(
            capabilities = ?ProviderCapabilities::of(self.provider.as_ref()),
            "Serving provider"
        );

        let Some(provider_schema) = self.provider_schema(ctx, diagnostics) else {
            return resp;
        };
        let Some(provider) = describe(
            &provider_schema,
            "Error converting provider schema",
            "The provider schema",
            diagnostics,
        ) else {
            return resp;
        };

        let mut provider_meta = None;
        if let Some(meta) = self.provider.as_provider_meta() {
            trace!("Provider implements ProviderWithMetaSchema");
            debug!("Calling provider defined Provider GetMetaSchema");
            let (schema, diags) = meta.meta_schema(ctx);
            debug!("Called provider defined Provider GetMetaSchema");
            diagnostics.append(diags);
            if diagnostics.has_error() {
                return resp;
            }
            provider_meta = describe(
                &schema,
                "Error converting provider_meta schema",
                "The provider_meta schema",
                diagnostics,
            );
            if provider_meta.is_none() {
                return resp;
            }
        }

        debug!("Calling provider defined Provider GetResources");
        let (resource_types, diags) = self.provider.resources(ctx);
        debug!("Called provider defined Provider GetResources");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return resp;
        }
        let mut resource_schemas = std::collections::BTreeMap::new();
        for (name, resource_type) in &resource_types {
            trace!(tf_resource_type = %name, "Found resource type");
            let Some(schema) = self.resource_schema(ctx, resource_type.as_ref(), diagnostics) else {
                return resp;
            };
            let subject = format!("The schema for the resource {:?}", name);
            let Some(descriptor) = describe(
                &schema,
                "Error converting resource schema",
                &subject,
                diagnostics,
            ) else {
                return resp;
            };
            resource_schemas.insert(name.clone(), descriptor);
        }

        debug!("Calling provider defined Provider GetDataSources");
        let (data_source_types, diags) = self.provider.data_sources(ctx);
        debug!("Called provider defined Provider GetDataSources");
        diagnostics.append(diags);
        if diagnostics.has_error() {
            return resp;
        }
        let mut data_source_schemas = std::collections::BTreeMap::new();
        for (name, data_source_type) in &data_source_types {
            trace!(tf_data_source_type = %name, "Found data source type");
            debug!("Calling provider defined DataSourceType GetSchema");
            let (schema, diags) = data_source_type.schema(ctx);
            debug!("Called provider defined DataSourceType GetSchema");
            diagnostics.append(diags);
            if diagnostics.has_error() {
                return resp;
            }
            let subject = format!("The schema for the data source {:?}", name);
            let Some(descriptor) = describe(
                &schema,
                "Error converting data source schema",
                &subject,
                diagnostics,
            ) else {
                return resp;
            };
            data_source_schemas.insert(name.clone(), descriptor);
        }

        // populated only once every schema converted cleanly
        resp.provider = Some(provider);
        resp.provider_meta = provider_meta;
        resp.resource_schemas = resource_schemas;
        resp.data_source_schemas = data_source_schemas;
        info!(
            resources = resp.resource_schemas.len(),
            data_sources = resp.data_source_schemas.len(),
            "GetProviderSchema completed"
        );
        resp
    }

    /// Validate the provider configuration. The request config is echoed
    /// back as the prepared config.
    #[instrument(skip_all, name = "rpc.validate_provider_config")]
    pub async fn validate_provider_config(
        &self,
        ctx: &Context,
        req: protocol::ValidateProviderConfigRequest,
    ) -> protocol::ValidateProviderConfigResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ValidateProviderConfigResponse {
            prepared_config: req.config.clone(),
            diagnostics: Diagnostics::new(),
        };
        let diagnostics = &mut resp.diagnostics;

        let Some(schema) = self.provider_schema(ctx, diagnostics) else {
            return resp;
        };
        let Some(value) = decode(
            &req.config,
            &schema,
            "Error parsing config",
            "The provider had a problem parsing the config. Report this to the provider developer:",
            diagnostics,
        ) else {
            return resp;
        };
        let config = Config::new(schema, value);

        if let Some(provider) = self.provider.as_config_validators() {
            trace!("Provider implements ProviderWithConfigValidators");
            run_config_validators(
                &provider.config_validators(ctx),
                &config,
                "ProviderConfigValidator",
                diagnostics,
            );
        }

        if let Some(provider) = self.provider.as_validate_config() {
            trace!("Provider implements ProviderWithValidateConfig");
            let mut hook = ValidateConfigResponse::default();
            debug!("Calling provider defined Provider ValidateConfig");
            provider
                .validate_config(ctx, ValidateConfigRequest { config: config.clone() }, &mut hook)
                .await;
            debug!("Called provider defined Provider ValidateConfig");
            diagnostics.append(hook.diagnostics);
        }

        diagnostics.append(config.schema.validate(&config));
        log_outcome("ValidateProviderConfig", diagnostics);
        resp
    }

    /// Configure the provider.
    #[instrument(skip_all, name = "rpc.configure_provider")]
    pub async fn configure_provider(
        &self,
        ctx: &Context,
        req: protocol::ConfigureProviderRequest,
    ) -> protocol::ConfigureProviderResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ConfigureProviderResponse::default();
        let diagnostics = &mut resp.diagnostics;

        let Some(schema) = self.provider_schema(ctx, diagnostics) else {
            return resp;
        };
        let Some(value) = decode(
            &req.config,
            &schema,
            "Error parsing config",
            "The provider had a problem parsing the config. Report this to the provider developer:",
            diagnostics,
        ) else {
            return resp;
        };

        let configure_req = crate::provider::ConfigureProviderRequest {
            terraform_version: req.terraform_version,
            config: Config::new(schema, value),
        };
        let mut configure_resp = crate::provider::ConfigureProviderResponse::default();
        debug!("Calling provider defined Provider Configure");
        self.provider.configure(ctx, configure_req, &mut configure_resp).await;
        debug!("Called provider defined Provider Configure");
        diagnostics.append(configure_resp.diagnostics);

        log_outcome("ConfigureProvider", diagnostics);
        resp
    }

    /// Cancel every in-flight invocation.
    #[instrument(skip_all, name = "rpc.stop_provider")]
    pub async fn stop_provider(
        &self,
        _ctx: &Context,
        _req: protocol::StopProviderRequest,
    ) -> protocol::StopProviderResponse {
        let cancelled = self.cancellations.cancel_all();
        info!(cancelled, "StopProvider completed");
        protocol::StopProviderResponse::default()
    }

    // =========================================================================
    // Resource RPCs
    // =========================================================================

    /// Validate a resource configuration.
    #[instrument(
        skip_all,
        name = "rpc.validate_resource_config",
        fields(tf_resource_type = tracing::field::Empty)
    )]
    pub async fn validate_resource_config(
        &self,
        ctx: &Context,
        req: protocol::ValidateResourceConfigRequest,
    ) -> protocol::ValidateResourceConfigResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ValidateResourceConfigResponse::default();
        let diagnostics = &mut resp.diagnostics;

        let Some((schema, resource)) = self.resource(ctx, &req.type_name, diagnostics) else {
            return resp;
        };
        let Some(value) = decode(
            &req.config,
            &schema,
            "Error parsing config",
            "The provider had a problem parsing the config. Report this to the provider developer:",
            diagnostics,
        ) else {
            return resp;
        };
        let config = Config::new(schema, value);

        if let Some(resource) = resource.as_config_validators() {
            trace!("Resource implements ResourceWithConfigValidators");
            run_config_validators(
                &resource.config_validators(ctx),
                &config,
                "ResourceConfigValidator",
                diagnostics,
            );
        }

        if let Some(resource) = resource.as_validate_config() {
            trace!("Resource implements ResourceWithValidateConfig");
            let mut hook = ValidateConfigResponse::default();
            debug!("Calling provider defined Resource ValidateConfig");
            resource
                .validate_config(ctx, ValidateConfigRequest { config: config.clone() }, &mut hook)
                .await;
            debug!("Called provider defined Resource ValidateConfig");
            diagnostics.append(hook.diagnostics);
        }

        diagnostics.append(config.schema.validate(&config));
        log_outcome("ValidateResourceConfig", diagnostics);
        resp
    }

    /// Upgrade stored state to the current schema version.
    #[instrument(
        skip_all,
        name = "rpc.upgrade_resource_state",
        fields(tf_resource_type = tracing::field::Empty, version = req.version)
    )]
    pub async fn upgrade_resource_state(
        &self,
        ctx: &Context,
        req: protocol::UpgradeResourceStateRequest,
    ) -> protocol::UpgradeResourceStateResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::UpgradeResourceStateResponse::default();

        let Some(resource_type) = self.resource_type(
            ctx,
            &req.type_name,
            &mut resp.diagnostics,
        ) else {
            return resp;
        };
        // nothing stored, nothing to upgrade
        let Some(raw_state) = req.raw_state else {
            return resp;
        };
        let Some(schema) = self.resource_schema(
            ctx,
            resource_type.as_ref(),
            &mut resp.diagnostics,
        ) else {
            return resp;
        };

        let result = if req.version == schema.version {
            pass_through(&schema, &raw_state)
        } else {
            let Some(resource) = self.new_resource(
                ctx,
                resource_type.as_ref(),
                &mut resp.diagnostics,
            ) else {
                return resp;
            };
            let upgraders = resource.as_upgrade_state().map(|resource| {
                trace!("Resource implements ResourceWithUpgradeState");
                debug!("Calling provider defined Resource UpgradeState");
                let upgraders = resource.upgrade_state(ctx);
                debug!("Called provider defined Resource UpgradeState");
                upgraders
            });
            run_upgrader(ctx, upgraders.as_ref(), req.version, &raw_state)
        };

        debug!(status = %result.status, "UpgradeResourceState finished");
        resp.diagnostics.append(result.diagnostics);
        resp.upgraded_state = result.upgraded_state;
        log_outcome("UpgradeResourceState", &resp.diagnostics);
        resp
    }

    /// Refresh a resource's state.
    #[instrument(
        skip_all,
        name = "rpc.read_resource",
        fields(tf_resource_type = tracing::field::Empty)
    )]
    pub async fn read_resource(
        &self,
        ctx: &Context,
        req: protocol::ReadResourceRequest,
    ) -> protocol::ReadResourceResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ReadResourceResponse::default();
        let diagnostics = &mut resp.diagnostics;

        let Some((schema, resource)) = self.resource(ctx, &req.type_name, diagnostics) else {
            return resp;
        };
        let Some(current) = decode(
            &req.current_state,
            &schema,
            "Error parsing current state",
            "There was an error parsing the current state. Please report this to the provider \
             developer:",
            diagnostics,
        ) else {
            return resp;
        };
        let provider_meta = self.provider_meta(ctx, req.provider_meta.as_ref(), diagnostics);
        if diagnostics.has_error() {
            return resp;
        }

        let state = State::new(schema, current);
        let read_req = ReadResourceRequest {
            state: state.clone(),
            private: req.private.clone(),
            provider_meta,
        };
        let mut read_resp = ReadResourceResponse {
            state,
            diagnostics: Diagnostics::new(),
        };
        debug!("Calling provider defined Resource Read");
        resource.read(ctx, read_req, &mut read_resp).await;
        debug!("Called provider defined Resource Read");
        diagnostics.append(read_resp.diagnostics);

        resp.new_state = encode(
            &read_resp.state.raw,
            "Error converting read response",
            "the read response",
            diagnostics,
        );
        resp.private = req.private;
        log_outcome("ReadResource", diagnostics);
        resp
    }

    /// Plan a change to a resource.
    #[instrument(
        skip_all,
        name = "rpc.plan_resource_change",
        fields(tf_resource_type = tracing::field::Empty)
    )]
    pub async fn plan_resource_change(
        &self,
        ctx: &Context,
        req: protocol::PlanResourceChangeRequest,
    ) -> protocol::PlanResourceChangeResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::PlanResourceChangeResponse::default();
        let diagnostics = &mut resp.diagnostics;

        let Some((schema, resource)) = self.resource(ctx, &req.type_name, diagnostics) else {
            return resp;
        };
        let Some((config, plan, prior)) = decode_change(
            &req.config,
            &req.proposed_new_state,
            &req.prior_state,
            &schema,
            diagnostics,
        ) else {
            return resp;
        };
        let provider_meta = self.provider_meta(ctx, req.provider_meta.as_ref(), diagnostics);
        if diagnostics.has_error() {
            return resp;
        }

        let config = Config::new(schema.clone(), config);
        let state = State::new(schema.clone(), prior);
        let proposed = Plan::new(schema, plan);
        let change = plan_resource_change(
            ctx,
            resource.as_ref(),
            &config,
            &state,
            proposed,
            provider_meta.as_ref(),
        )
        .await;
        diagnostics.append(change.diagnostics);

        resp.planned_state = encode(
            &change.plan.raw,
            "Error converting response",
            "the state in the response",
            diagnostics,
        );
        resp.requires_replace = change.requires_replace;
        resp.planned_private = req.prior_private;
        debug!(requires_replace = resp.requires_replace.len(), "PlanResourceChange finished");
        log_outcome("PlanResourceChange", &resp.diagnostics);
        resp
    }

    /// Apply a planned change: create, update or delete.
    #[instrument(
        skip_all,
        name = "rpc.apply_resource_change",
        fields(tf_resource_type = tracing::field::Empty)
    )]
    pub async fn apply_resource_change(
        &self,
        ctx: &Context,
        req: protocol::ApplyResourceChangeRequest,
    ) -> protocol::ApplyResourceChangeResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        // the prior state is echoed back unless an operation runs
        let mut resp = protocol::ApplyResourceChangeResponse {
            new_state: Some(req.prior_state.clone()),
            ..Default::default()
        };
        let diagnostics = &mut resp.diagnostics;

        let Some((schema, resource)) = self.resource(ctx, &req.type_name, diagnostics) else {
            return resp;
        };
        let Some((config, plan, prior)) = decode_change(
            &req.config,
            &req.planned_state,
            &req.prior_state,
            &schema,
            diagnostics,
        ) else {
            return resp;
        };

        let create = prior.is_null() && !plan.is_null();
        let update = !prior.is_null() && !plan.is_null();
        let delete = !prior.is_null() && plan.is_null();

        let provider_meta = self.provider_meta(ctx, req.provider_meta.as_ref(), diagnostics);
        if diagnostics.has_error() {
            return resp;
        }

        match (create, update, delete) {
            (true, false, false) => {
                trace!("running create");
                let create_req = CreateResourceRequest {
                    config: Config::new(schema.clone(), config),
                    plan: Plan::new(schema.clone(), plan),
                    provider_meta,
                };
                let mut create_resp = CreateResourceResponse {
                    state: State::new(schema, prior),
                    diagnostics: Diagnostics::new(),
                };
                debug!("Calling provider defined Resource Create");
                resource.create(ctx, create_req, &mut create_resp).await;
                debug!("Called provider defined Resource Create");
                diagnostics.append(create_resp.diagnostics);
                resp.new_state = encode(
                    &create_resp.state.raw,
                    "Error converting create response",
                    "the create response",
                    diagnostics,
                );
            }
            (false, true, false) => {
                trace!("running update");
                let state = State::new(schema.clone(), prior);
                let update_req = UpdateResourceRequest {
                    config: Config::new(schema.clone(), config),
                    plan: Plan::new(schema, plan),
                    state: state.clone(),
                    provider_meta,
                };
                let mut update_resp = UpdateResourceResponse {
                    state,
                    diagnostics: Diagnostics::new(),
                };
                debug!("Calling provider defined Resource Update");
                resource.update(ctx, update_req, &mut update_resp).await;
                debug!("Called provider defined Resource Update");
                diagnostics.append(update_resp.diagnostics);
                resp.new_state = encode(
                    &update_resp.state.raw,
                    "Error converting update response",
                    "the update response",
                    diagnostics,
                );
            }
            (false, false, true) => {
                trace!("running delete");
                let state = State::new(schema, prior);
                let delete_req = DeleteResourceRequest {
                    state: state.clone(),
                    provider_meta,
                };
                let mut delete_resp = DeleteResourceResponse {
                    state,
                    diagnostics: Diagnostics::new(),
                };
                debug!("Calling provider defined Resource Delete");
                resource.delete(ctx, delete_req, &mut delete_resp).await;
                debug!("Called provider defined Resource Delete");
                diagnostics.append(delete_resp.diagnostics);

                if !diagnostics.has_error() {
                    trace!("No provider defined Delete errors detected, ensuring State is cleared");
                    delete_resp.state.remove_resource();
                }
                resp.new_state = encode(
                    &delete_resp.state.raw,
                    "Error converting delete response",
                    "the delete response",
                    diagnostics,
                );
            }
            _ => {
                diagnostics.add_error(
                    "Error understanding request",
                    format!(
                        "An unexpected error was encountered trying to understand the type of \
                         request being made. This is always an error in the provider. Please \
                         report the following to the provider developer:\n\nRequest matched \
                         unexpected number of methods: (create: {}, update: {}, delete: {})",
                        create, update, delete
                    ),
                );
                error!(
                    create,
                    update,
                    delete,
                    "ApplyResourceChange could not classify the request"
                );
                return resp;
            }
        }

        resp.private = req.planned_private;
        log_outcome("ApplyResourceChange", &resp.diagnostics);
        resp
    }

    /// Import an existing resource. Importing is not supported, so every
    /// request for a known resource type fails with an error diagnostic.
    #[instrument(
        skip_all,
        name = "rpc.import_resource_state",
        fields(tf_resource_type = tracing::field::Empty)
    )]
    pub async fn import_resource_state(
        &self,
        ctx: &Context,
        req: protocol::ImportResourceStateRequest,
    ) -> protocol::ImportResourceStateResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ImportResourceStateResponse::default();
        let diagnostics = &mut resp.diagnostics;

        if self.resource_type(ctx, &req.type_name, diagnostics).is_none() {
            return resp;
        }
        diagnostics.add_error(
            "Resource Import Not Implemented",
            "This resource does not support import. \
             Please contact the provider developer for additional information.",
        );
        log_outcome("ImportResourceState", diagnostics);
        resp
    }

    // =========================================================================
    // Data source RPCs
    // =========================================================================

    /// Validate a data source configuration.
    #[instrument(
        skip_all,
        name = "rpc.validate_data_source_config",
        fields(tf_data_source_type = tracing::field::Empty)
    )]
    pub async fn validate_data_source_config(
        &self,
        ctx: &Context,
        req: protocol::ValidateDataSourceConfigRequest,
    ) -> protocol::ValidateDataSourceConfigResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ValidateDataSourceConfigResponse::default();
        let diagnostics = &mut resp.diagnostics;

        let Some((schema, data_source)) = self.data_source(ctx, &req.type_name, diagnostics) else {
            return resp;
        };
        let Some(value) = decode(
            &req.config,
            &schema,
            "Error parsing config",
            "The provider had a problem parsing the config. Report this to the provider developer:",
            diagnostics,
        ) else {
            return resp;
        };
        let config = Config::new(schema, value);

        if let Some(data_source) = data_source.as_config_validators() {
            trace!("DataSource implements DataSourceWithConfigValidators");
            run_config_validators(
                &data_source.config_validators(ctx),
                &config,
                "DataSourceConfigValidator",
                diagnostics,
            );
        }

        if let Some(data_source) = data_source.as_validate_config() {
            trace!("DataSource implements DataSourceWithValidateConfig");
            let mut hook = ValidateConfigResponse::default();
            debug!("Calling provider defined DataSource ValidateConfig");
            data_source
                .validate_config(ctx, ValidateConfigRequest { config: config.clone() }, &mut hook)
                .await;
            debug!("Called provider defined DataSource ValidateConfig");
            diagnostics.append(hook.diagnostics);
        }

        diagnostics.append(config.schema.validate(&config));
        log_outcome("ValidateDataSourceConfig", diagnostics);
        resp
    }

    /// Read a data source.
    #[instrument(
        skip_all,
        name = "rpc.read_data_source",
        fields(tf_data_source_type = tracing::field::Empty)
    )]
    pub async fn read_data_source(
        &self,
        ctx: &Context,
        req: protocol::ReadDataSourceRequest,
    ) -> protocol::ReadDataSourceResponse {
        let registration = self.cancellations.register(ctx);
        let ctx = registration.context();
        let mut resp = protocol::ReadDataSourceResponse::default();
        let diagnostics = &mut resp.diagnostics;

        let Some((schema, data_source)) = self.data_source(ctx, &req.type_name, diagnostics) else {
            return resp;
        };
        let Some(value) = decode(
            &req.config,
            &schema,
            "Error parsing config",
            "There was an error parsing the data source config. Please report this to the provider \
             developer:",
            diagnostics,
        ) else {
            return resp;
        };
        let provider_meta = self.provider_meta(ctx, req.provider_meta.as_ref(), diagnostics);
        if diagnostics.has_error() {
            return resp;
        }

        let read_req = ReadDataSourceRequest {
            config: Config::new(schema.clone(), value.clone()),
            provider_meta,
        };
        let mut read_resp = ReadDataSourceResponse {
            state: State::new(schema, value),
            diagnostics: Diagnostics::new(),
        };
        debug!("Calling provider defined DataSource Read");
        data_source.read(ctx, read_req, &mut read_resp).await;
        debug!("Called provider defined DataSource Read");
        diagnostics.append(read_resp.diagnostics);

        resp.state = encode(
            &read_resp.state.raw,
            "Error converting read response",
            "the read response",
            diagnostics,
        );
        log_outcome("ReadDataSource", diagnostics);
        resp
    }
}

impl<P: Provider> std::fmt::Debug for ProviderServer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderServer")
            .field("in_flight", &self.cancellations.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn describe(
    schema: &Schema,
    summary: &str,
    subject: &str,
    diagnostics: &mut Diagnostics,
) -> Option<SchemaDescriptor> {
    match SchemaDescriptor::from_schema(schema) {
        Ok(descriptor) => Some(descriptor),
        Err(err) => {
            diagnostics.add_error(
                summary,
                format!("{} {}{}", subject, SCHEMA_CONVERSION_DETAIL, err),
            );
            None
        }
    }
}

fn decode(
    raw: &DynamicValue,
    schema: &Schema,
    summary: &str,
    detail: &str,
    diagnostics: &mut Diagnostics,
) -> Option<Value> {
    match raw.decode(&schema.terraform_type()) {
        Ok(value) => Some(value),
        Err(err) => {
            diagnostics.add_error(summary, format!("{}\n\n{}", detail, err));
            None
        }
    }
}

/// Decode config, planned or proposed state, and prior state.
fn decode_change(
    config: &DynamicValue,
    plan: &DynamicValue,
    prior: &DynamicValue,
    schema: &Schema,
    diagnostics: &mut Diagnostics,
) -> Option<(Value, Value, Value)> {
    let config = decode(
        config,
        schema,
        "Error parsing configuration",
        "An unexpected error was encountered trying to parse the configuration. This is always an \
         error in the provider. Please report the following to the provider developer:",
        diagnostics,
    )?;
    let plan = decode(
        plan,
        schema,
        "Error parsing plan",
        "An unexpected error was encountered trying to parse the plan. This is always an error in \
         the provider. Please report the following to the provider developer:",
        diagnostics,
    )?;
    let prior = decode(
        prior,
        schema,
        "Error parsing prior state",
        "An unexpected error was encountered trying to parse the prior state. This is always an \
         error in the provider. Please report the following to the provider developer:",
        diagnostics,
    )?;
    Some((config, plan, prior))
}

fn encode(
    value: &Value,
    summary: &str,
    subject: &str,
    diagnostics: &mut Diagnostics,
) -> Option<DynamicValue> {
    match DynamicValue::encode(value) {
        Ok(encoded) => Some(encoded),
        Err(err) => {
            diagnostics.add_error(
                summary,
                format!(
                    "An unexpected error was encountered when converting {} to a usable type. This \
                     is always a problem with the provider. Please give the following information \
                     to the provider developer:\n\n{}",
                    subject, err
                ),
            );
            None
        }
    }
}

fn run_config_validators(
    validators: &[Arc<dyn ConfigValidator>],
    config: &Config,
    kind: &str,
    diagnostics: &mut Diagnostics,
) {
    for validator in validators {
        let description = validator.description();
        debug!(description = %description, "Calling provider defined {}", kind);
        diagnostics.append(validator.validate(config));
        debug!(description = %description, "Called provider defined {}", kind);
    }
}

fn log_outcome(rpc: &str, diagnostics: &Diagnostics) {
    if diagnostics.has_error() {
        warn!(diagnostics = diagnostics.len(), "{} completed with errors", rpc);
    } else {
        info!("{} completed successfully", rpc);
    }
}
