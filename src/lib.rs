//! Hemmer Provider Framework
//!
//! A schema-driven framework for building providers that speak the
//! Terraform plugin protocol (version 6). Provider authors declare schemas
//! and implement typed lifecycle callbacks; the framework decodes wire
//! values, validates configuration, computes plans, upgrades stored state
//! and reports everything back as diagnostics.
//!
//! # Overview
//!
//! - **Values**: [`value::Value`] is a typed value that can be null or
//!   unknown, addressed by [`path::Path`] and encoded by [`codec`].
//! - **Schemas**: [`schema::Schema`] describes attributes and nested blocks;
//!   [`protocol`] turns schemas into the descriptors the host consumes.
//! - **Provider traits**: [`provider::Provider`], [`provider::Resource`] and
//!   [`provider::DataSource`], with optional capabilities for validation,
//!   plan modification and state upgrades.
//! - **Server**: [`server::ProviderServer`] implements each RPC on top of a
//!   provider.
//! - **Testing**: [`testing::ProviderTester`] drives a provider with JSON.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_framework::{
//!     async_trait,
//!     context::Context,
//!     diag::Diagnostics,
//!     provider::*,
//!     schema::{Attribute, Schema},
//!     server::ProviderServer,
//! };
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl Provider for MyProvider {
//!     fn schema(&self, _ctx: &Context) -> (Schema, Diagnostics) {
//!         let schema = Schema::v0().with_attribute("api_key", Attribute::optional_string());
//!         (schema, Diagnostics::new())
//!     }
//!
//!     async fn configure(
//!         &self,
//!         _ctx: &Context,
//!         _req: ConfigureProviderRequest,
//!         _resp: &mut ConfigureProviderResponse,
//!     ) {
//!     }
//!
//!     fn resources(&self, _ctx: &Context) -> (ResourceTypes<Self>, Diagnostics) {
//!         (BTreeMap::new(), Diagnostics::new())
//!     }
//!
//!     fn data_sources(&self, _ctx: &Context) -> (DataSourceTypes<Self>, Diagnostics) {
//!         (BTreeMap::new(), Diagnostics::new())
//!     }
//! }
//!
//! let server = ProviderServer::new(MyProvider);
//! ```
//!
//! # Provider Protocol
//!
//! [`server::ProviderServer`] serves:
//!
//! - **GetProviderSchema**: provider, provider_meta, resource and data source schemas
//! - **ValidateProviderConfig** / **ConfigureProvider** / **StopProvider**
//! - **ValidateResourceConfig**, **UpgradeResourceState**, **ReadResource**
//! - **PlanResourceChange** / **ApplyResourceChange**
//! - **ValidateDataSourceConfig** / **ReadDataSource**

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod context;
pub mod data;
pub mod diag;
pub mod error;
pub mod logging;
pub mod path;
pub mod plan;
pub mod plan_modifier;
pub mod protocol;
pub mod provider;
pub mod reflect;
pub mod schema;
pub mod server;
pub mod testing;
pub mod upgrade;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use context::Context;
pub use diag::{Diagnostic, Diagnostics};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use path::Path;
pub use provider::Provider;
pub use schema::{Attribute, Schema};
pub use server::ProviderServer;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
