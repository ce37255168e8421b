//! Framed requests and responses of the provider protocol.
//!
//! The transport that carries these is external: it decodes a host message
//! into one of the request structs, hands it to
//! [`ProviderServer`](crate::server::ProviderServer), and frames the
//! response it gets back. Values stay in their wire encoding
//! ([`DynamicValue`]) at this layer.
//!
//! Schemas are served as descriptors ([`SchemaDescriptor`]). Converting a
//! [`Schema`] into its descriptor also checks that the definition is one the
//! host can accept.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::codec::{DynamicValue, RawState};
use crate::diag::Diagnostics;
use crate::error::SchemaError;
use crate::path::Path;
use crate::schema::{
    Attribute, AttributeKind, Block, NestedAttributes, NestedBlock, NestingMode, Schema,
};
use crate::value::Type;

// =============================================================================
// Schema descriptors
// =============================================================================

/// How a description string is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StringKind {
    /// Plain text.
    #[default]
    Plain,
    /// Markdown.
    Markdown,
}

/// Nesting of an object on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectNesting {
    /// A single object.
    Single,
    /// A list of objects.
    List,
    /// A set of objects.
    Set,
    /// A map of objects.
    Map,
}

impl From<NestingMode> for ObjectNesting {
    fn from(mode: NestingMode) -> Self {
        match mode {
            NestingMode::Single => Self::Single,
            NestingMode::List => Self::List,
            NestingMode::Set => Self::Set,
            NestingMode::Map => Self::Map,
        }
    }
}

/// A schema as served to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDescriptor {
    /// Schema version.
    pub version: i64,
    /// Root block.
    pub block: BlockDescriptor,
}

/// A block as served to the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BlockDescriptor {
    /// Attributes, sorted by name.
    pub attributes: Vec<AttributeDescriptor>,
    /// Nested blocks, sorted by type name.
    pub block_types: Vec<NestedBlockDescriptor>,
    /// Description text.
    pub description: String,
    /// Format of `description`.
    pub description_kind: StringKind,
    /// Whether the block is deprecated.
    pub deprecated: bool,
}

/// An attribute as served to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDescriptor {
    /// Attribute name.
    pub name: String,
    /// Value type of a typed attribute, serialized as a JSON type constraint.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
    /// Nested attributes of a nested attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<ObjectDescriptor>,
    /// Description text.
    pub description: String,
    /// Format of `description`.
    pub description_kind: StringKind,
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Set by the provider.
    pub computed: bool,
    /// Hidden from output.
    pub sensitive: bool,
    /// Whether the attribute is deprecated.
    pub deprecated: bool,
}

/// The nested attributes of a nested attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDescriptor {
    /// Attributes, sorted by name.
    pub attributes: Vec<AttributeDescriptor>,
    /// How the objects are grouped.
    pub nesting: ObjectNesting,
    /// Minimum number of objects.
    pub min_items: u32,
    /// Maximum number of objects, 0 for no limit.
    pub max_items: u32,
}

/// A nested block as served to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedBlockDescriptor {
    /// Block type name.
    pub type_name: String,
    /// The block itself.
    pub block: BlockDescriptor,
    /// How the blocks are grouped. Map nesting is never served.
    pub nesting: ObjectNesting,
    /// Minimum number of blocks.
    pub min_items: u32,
    /// Maximum number of blocks, 0 for no limit.
    pub max_items: u32,
}

fn invalid(path: &Path, message: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDefinition {
        path: path.clone(),
        message: message.into(),
    }
}

/// Whether `name` is usable as an attribute or block name.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn description(
    plain: &Option<String>,
    markdown: &Option<String>,
) -> (String, StringKind) {
    match (markdown, plain) {
        (Some(md), _) if !md.is_empty() => (md.clone(), StringKind::Markdown),
        (_, Some(text)) if !text.is_empty() => (text.clone(), StringKind::Plain),
        _ => (String::new(), StringKind::Plain),
    }
}

impl SchemaDescriptor {
    /// Convert `schema`, checking that its definition is servable.
    ///
    /// ```
    /// use hemmer_provider_framework::protocol::SchemaDescriptor;
    /// use hemmer_provider_framework::schema::{Attribute, Schema};
    ///
    /// let schema = Schema::v0().with_attribute("name", Attribute::required_string());
    /// let descriptor = SchemaDescriptor::from_schema(&schema).unwrap();
    /// assert_eq!(descriptor.block.attributes[0].name, "name");
    ///
    /// assert!(SchemaDescriptor::from_schema(&Schema::v0()).is_err());
    /// ```
    pub fn from_schema(schema: &Schema) -> Result<Self, SchemaError> {
        if schema.block.attributes.is_empty() && schema.block.blocks.is_empty() {
            return Err(invalid(
                &Path::empty(),
                "must have at least one attribute or block in the schema",
            ));
        }
        Ok(Self {
            version: schema.version,
            block: block_descriptor(&schema.block, &Path::empty())?,
        })
    }
}

fn block_descriptor(block: &Block, path: &Path) -> Result<BlockDescriptor, SchemaError> {
    let mut attributes = Vec::with_capacity(block.attributes.len());
    for (name, attr) in &block.attributes {
        if block.blocks.contains_key(name) {
            return Err(invalid(
                &path.at_name(name.as_str()),
                "name is used by both an attribute and a block",
            ));
        }
        attributes.push(attribute_descriptor(name, attr, &path.at_name(name.as_str()))?);
    }

    let mut block_types = Vec::with_capacity(block.blocks.len());
    for (name, nested) in &block.blocks {
        block_types.push(nested_block_descriptor(name, nested, &path.at_name(name.as_str()))?);
    }

    let (description, description_kind) =
        description(&block.description, &block.markdown_description);
    Ok(BlockDescriptor {
        attributes,
        block_types,
        description,
        description_kind,
        deprecated: block.deprecation_message.is_some(),
    })
}

fn attribute_descriptor(
    name: &str,
    attr: &Attribute,
    path: &Path,
) -> Result<AttributeDescriptor, SchemaError> {
    if !is_valid_identifier(name) {
        return Err(invalid(
            path,
            format!("invalid attribute name {name:?}, names must match [a-z_][a-z0-9_]*"),
        ));
    }
    let flags = attr.flags;
    if !flags.required && !flags.optional && !flags.computed {
        return Err(invalid(path, "must have Required, Optional, or Computed set"));
    }
    if flags.required && (flags.optional || flags.computed) {
        return Err(invalid(path, "Required cannot be combined with Optional or Computed"));
    }

    let (ty, nested_type) = match &attr.kind {
        AttributeKind::Typed(attr_type) => (Some(attr_type.terraform_type()), None),
        AttributeKind::Nested(nested) => (None, Some(object_descriptor(nested, path)?)),
    };
    let (description, description_kind) =
        description(&attr.description, &attr.markdown_description);
    Ok(AttributeDescriptor {
        name: name.to_string(),
        ty,
        nested_type,
        description,
        description_kind,
        required: flags.required,
        optional: flags.optional,
        computed: flags.computed,
        sensitive: flags.sensitive,
        deprecated: attr.deprecation_message.is_some(),
    })
}

fn object_descriptor(
    nested: &NestedAttributes,
    path: &Path,
) -> Result<ObjectDescriptor, SchemaError> {
    let attributes = nested
        .attributes
        .iter()
        .map(|(name, attr)| attribute_descriptor(name, attr, &path.at_name(name.as_str())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ObjectDescriptor {
        attributes,
        nesting: nested.nesting_mode.into(),
        min_items: nested.min_items,
        max_items: nested.max_items,
    })
}

fn nested_block_descriptor(
    name: &str,
    nested: &NestedBlock,
    path: &Path,
) -> Result<NestedBlockDescriptor, SchemaError> {
    if !is_valid_identifier(name) {
        return Err(invalid(
            path,
            format!("invalid block name {name:?}, names must match [a-z_][a-z0-9_]*"),
        ));
    }
    if nested.nesting_mode == NestingMode::Map {
        return Err(invalid(path, "unsupported Blocks nesting mode: map"));
    }
    Ok(NestedBlockDescriptor {
        type_name: name.to_string(),
        block: block_descriptor(&nested.block, path)?,
        nesting: nested.nesting_mode.into(),
        min_items: nested.min_items,
        max_items: nested.max_items,
    })
}

// =============================================================================
// Provider RPCs
// =============================================================================

/// GetProviderSchema request.
#[derive(Debug, Clone, Default)]
pub struct GetProviderSchemaRequest;

/// GetProviderSchema response. Schemas are only populated when no error
/// diagnostic was produced.
#[derive(Debug, Clone, Default)]
pub struct GetProviderSchemaResponse {
    /// Provider configuration schema.
    pub provider: Option<SchemaDescriptor>,
    /// Provider meta schema, when the provider declares one.
    pub provider_meta: Option<SchemaDescriptor>,
    /// Resource schemas by type name.
    pub resource_schemas: BTreeMap<String, SchemaDescriptor>,
    /// Data source schemas by type name.
    pub data_source_schemas: BTreeMap<String, SchemaDescriptor>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// ValidateProviderConfig request.
#[derive(Debug, Clone, Default)]
pub struct ValidateProviderConfigRequest {
    /// Provider configuration.
    pub config: DynamicValue,
}

/// ValidateProviderConfig response.
#[derive(Debug, Clone, Default)]
pub struct ValidateProviderConfigResponse {
    /// The request configuration, echoed back.
    pub prepared_config: DynamicValue,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// ConfigureProvider request.
#[derive(Debug, Clone, Default)]
pub struct ConfigureProviderRequest {
    /// Version of the host driving the provider.
    pub terraform_version: String,
    /// Provider configuration.
    pub config: DynamicValue,
}

/// ConfigureProvider response.
#[derive(Debug, Clone, Default)]
pub struct ConfigureProviderResponse {
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// StopProvider request.
#[derive(Debug, Clone, Default)]
pub struct StopProviderRequest;

/// StopProvider response.
#[derive(Debug, Clone, Default)]
pub struct StopProviderResponse {
    /// Empty unless stopping failed.
    pub error: String,
}

// =============================================================================
// Resource RPCs
// =============================================================================

/// ValidateResourceConfig request.
#[derive(Debug, Clone, Default)]
pub struct ValidateResourceConfigRequest {
    /// Resource type name.
    pub type_name: String,
    /// Resource configuration.
    pub config: DynamicValue,
}

/// ValidateResourceConfig response.
#[derive(Debug, Clone, Default)]
pub struct ValidateResourceConfigResponse {
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// UpgradeResourceState request.
#[derive(Debug, Clone, Default)]
pub struct UpgradeResourceStateRequest {
    /// Resource type name.
    pub type_name: String,
    /// Schema version the stored state was written with.
    pub version: i64,
    /// The stored state.
    pub raw_state: Option<RawState>,
}

/// UpgradeResourceState response.
#[derive(Debug, Clone, Default)]
pub struct UpgradeResourceStateResponse {
    /// The state under the current schema.
    pub upgraded_state: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// ReadResource request.
#[derive(Debug, Clone, Default)]
pub struct ReadResourceRequest {
    /// Resource type name.
    pub type_name: String,
    /// State currently recorded by the host.
    pub current_state: DynamicValue,
    /// Provider private data.
    pub private: Vec<u8>,
    /// Provider meta value.
    pub provider_meta: Option<DynamicValue>,
}

/// ReadResource response.
#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// The refreshed state.
    pub new_state: Option<DynamicValue>,
    /// Provider private data.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// PlanResourceChange request.
#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeRequest {
    /// Resource type name.
    pub type_name: String,
    /// State before the change.
    pub prior_state: DynamicValue,
    /// The host's proposal for the new state.
    pub proposed_new_state: DynamicValue,
    /// Resource configuration.
    pub config: DynamicValue,
    /// Provider private data from the prior state.
    pub prior_private: Vec<u8>,
    /// Provider meta value.
    pub provider_meta: Option<DynamicValue>,
}

/// PlanResourceChange response.
#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeResponse {
    /// The planned new state.
    pub planned_state: Option<DynamicValue>,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<Path>,
    /// Provider private data for apply.
    pub planned_private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// ApplyResourceChange request.
#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeRequest {
    /// Resource type name.
    pub type_name: String,
    /// State before the change.
    pub prior_state: DynamicValue,
    /// Planned new state.
    pub planned_state: DynamicValue,
    /// Resource configuration.
    pub config: DynamicValue,
    /// Provider private data from the plan.
    pub planned_private: Vec<u8>,
    /// Provider meta value.
    pub provider_meta: Option<DynamicValue>,
}

/// ApplyResourceChange response.
#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeResponse {
    /// The state after the change.
    pub new_state: Option<DynamicValue>,
    /// Provider private data.
    pub private: Vec<u8>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// ImportResourceState request.
#[derive(Debug, Clone, Default)]
pub struct ImportResourceStateRequest {
    /// Resource type name.
    pub type_name: String,
    /// Identifier given by the practitioner.
    pub id: String,
}

/// A resource produced by an import.
#[derive(Debug, Clone, Default)]
pub struct ImportedResource {
    /// Resource type name.
    pub type_name: String,
    /// The imported state.
    pub state: DynamicValue,
    /// Provider private data.
    pub private: Vec<u8>,
}

/// ImportResourceState response.
#[derive(Debug, Clone, Default)]
pub struct ImportResourceStateResponse {
    /// Imported resources. Empty when the import failed.
    pub imported_resources: Vec<ImportedResource>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

// =============================================================================
// Data source RPCs
// =============================================================================

/// ValidateDataSourceConfig request.
#[derive(Debug, Clone, Default)]
pub struct ValidateDataSourceConfigRequest {
    /// Data source type name.
    pub type_name: String,
    /// Data source configuration.
    pub config: DynamicValue,
}

/// ValidateDataSourceConfig response.
#[derive(Debug, Clone, Default)]
pub struct ValidateDataSourceConfigResponse {
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// ReadDataSource request.
#[derive(Debug, Clone, Default)]
pub struct ReadDataSourceRequest {
    /// Data source type name.
    pub type_name: String,
    /// Data source configuration.
    pub config: DynamicValue,
    /// Provider meta value.
    pub provider_meta: Option<DynamicValue>,
}

/// ReadDataSource response.
#[derive(Debug, Clone, Default)]
pub struct ReadDataSourceResponse {
    /// The data read.
    pub state: Option<DynamicValue>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}
