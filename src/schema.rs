//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of provider configuration, resources, and data sources.
//! They drive decoding of wire values, validation, plan modification and path lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::data::Config;
use crate::diag::Diagnostics;
use crate::error::SchemaError;
use crate::path::{Path, PathStep};
use crate::plan_modifier::{AttributePlanModifier, RequiresReplace, TypePlanModifier};
use crate::validation::AttributeValidator;
use crate::value::Type;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A 64-bit floating point number.
    Float64,
    /// An arbitrary precision number.
    Number,
    /// A boolean value.
    Bool,
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// A set of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, AttributeType>),
    /// A fixed-length sequence with one type per position.
    Tuple(Vec<AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type.
    pub fn object(attributes: BTreeMap<String, AttributeType>) -> Self {
        Self::Object(attributes)
    }

    /// Create a tuple type.
    pub fn tuple(element_types: Vec<AttributeType>) -> Self {
        Self::Tuple(element_types)
    }

    /// The wire type values of this attribute type travel as.
    pub fn terraform_type(&self) -> Type {
        match self {
            Self::String => Type::String,
            Self::Int64 | Self::Float64 | Self::Number => Type::Number,
            Self::Bool => Type::Bool,
            Self::List(e) => Type::list(e.terraform_type()),
            Self::Set(e) => Type::set(e.terraform_type()),
            Self::Map(e) => Type::map(e.terraform_type()),
            Self::Object(attrs) => Type::Object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.terraform_type()))
                    .collect(),
            ),
            Self::Tuple(elems) => Type::Tuple(elems.iter().map(|e| e.terraform_type()).collect()),
        }
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (can be set, but has default from provider).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// How nested attributes or blocks are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestingMode {
    /// A single nested object.
    #[default]
    Single,
    /// An ordered list of nested objects.
    List,
    /// An unordered set of unique nested objects.
    Set,
    /// A map of nested objects keyed by string.
    Map,
}

impl NestingMode {
    fn wrap(self, object: AttributeType) -> AttributeType {
        match self {
            Self::Single => object,
            Self::List => AttributeType::list(object),
            Self::Set => AttributeType::set(object),
            Self::Map => AttributeType::map(object),
        }
    }

    fn accepts(self, step: &PathStep) -> bool {
        matches!(
            (self, step),
            (Self::List, PathStep::ElementKeyInt(_))
                | (Self::Set, PathStep::ElementKeyValue(_))
                | (Self::Map, PathStep::ElementKeyString(_))
        )
    }
}

impl fmt::Display for NestingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::List => f.write_str("list"),
            Self::Set => f.write_str("set"),
            Self::Map => f.write_str("map"),
        }
    }
}

/// Attributes nested under an attribute, with their grouping.
#[derive(Debug, Clone, Default)]
pub struct NestedAttributes {
    /// The nested attributes.
    pub attributes: BTreeMap<String, Attribute>,
    /// How the nested objects are grouped.
    pub nesting_mode: NestingMode,
    /// Minimum number of nested objects (list and set only).
    pub min_items: u32,
    /// Maximum number of nested objects, 0 for no limit (list and set only).
    pub max_items: u32,
}

impl NestedAttributes {
    fn with_mode(attributes: BTreeMap<String, Attribute>, nesting_mode: NestingMode) -> Self {
        Self {
            attributes,
            nesting_mode,
            min_items: 0,
            max_items: 0,
        }
    }

    /// A single nested object.
    pub fn single(attributes: BTreeMap<String, Attribute>) -> Self {
        Self::with_mode(attributes, NestingMode::Single)
    }

    /// A list of nested objects.
    pub fn list(attributes: BTreeMap<String, Attribute>) -> Self {
        Self::with_mode(attributes, NestingMode::List)
    }

    /// A set of nested objects.
    pub fn set(attributes: BTreeMap<String, Attribute>) -> Self {
        Self::with_mode(attributes, NestingMode::Set)
    }

    /// A map of nested objects.
    pub fn map(attributes: BTreeMap<String, Attribute>) -> Self {
        Self::with_mode(attributes, NestingMode::Map)
    }

    /// Set the minimum number of nested objects.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of nested objects.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    fn object_type(&self) -> AttributeType {
        AttributeType::Object(
            self.attributes
                .iter()
                .map(|(k, a)| (k.clone(), a.attribute_type()))
                .collect(),
        )
    }
}

/// What an attribute holds.
#[derive(Debug, Clone)]
pub enum AttributeKind {
    /// A value of a plain type. Its elements have no schema of their own.
    Typed(AttributeType),
    /// Nested attributes, each with their own schema.
    Nested(NestedAttributes),
}

/// Describes a single attribute in a schema.
#[derive(Clone)]
pub struct Attribute {
    /// Typed or nested.
    pub kind: AttributeKind,
    /// Flags describing how the attribute can be used.
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    pub description: Option<String>,
    /// Markdown description of the attribute.
    pub markdown_description: Option<String>,
    /// Set when the attribute is deprecated. The message tells practitioners what to do instead.
    pub deprecation_message: Option<String>,
    /// Validators run against the attribute's config value.
    pub validators: Vec<Arc<dyn AttributeValidator>>,
    /// Plan modifiers run against the attribute's planned value.
    pub plan_modifiers: Vec<Arc<dyn AttributePlanModifier>>,
    /// Plan modifiers run against every value of the attribute's type,
    /// before [`Attribute::plan_modifiers`].
    pub type_plan_modifiers: Vec<Arc<dyn TypePlanModifier>>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("description", &self.description)
            .field("deprecation_message", &self.deprecation_message)
            .field("validators", &self.validators.len())
            .field("plan_modifiers", &self.plan_modifiers.len())
            .field("type_plan_modifiers", &self.type_plan_modifiers.len())
            .finish()
    }
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self::from_kind(AttributeKind::Typed(attr_type), flags)
    }

    /// Create an attribute holding nested attributes.
    pub fn nested(nested: NestedAttributes, flags: AttributeFlags) -> Self {
        Self::from_kind(AttributeKind::Nested(nested), flags)
    }

    fn from_kind(kind: AttributeKind, flags: AttributeFlags) -> Self {
        Self {
            kind,
            flags,
            description: None,
            markdown_description: None,
            deprecation_message: None,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
            type_plan_modifiers: Vec::new(),
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Create a required int64 attribute.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Create an optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Create a computed int64 attribute.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Create a required bool attribute.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Create a computed bool attribute.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the markdown description for this attribute.
    pub fn with_markdown_description(mut self, description: impl Into<String>) -> Self {
        self.markdown_description = Some(description.into());
        self
    }

    /// Mark this attribute as deprecated.
    pub fn with_deprecation_message(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = Some(message.into());
        self
    }

    /// Add a validator.
    pub fn with_validator(mut self, validator: impl AttributeValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Add a plan modifier.
    pub fn with_plan_modifier(mut self, modifier: impl AttributePlanModifier + 'static) -> Self {
        self.plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// Add a plan modifier for the values of this attribute's type.
    pub fn with_type_plan_modifier(mut self, modifier: impl TypePlanModifier + 'static) -> Self {
        self.type_plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn with_force_new(self) -> Self {
        self.with_plan_modifier(RequiresReplace)
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// The nested attributes, if this is a nested attribute.
    pub fn nested_attributes(&self) -> Option<&NestedAttributes> {
        match &self.kind {
            AttributeKind::Nested(n) => Some(n),
            AttributeKind::Typed(_) => None,
        }
    }

    /// The semantic type of the attribute.
    pub fn attribute_type(&self) -> AttributeType {
        match &self.kind {
            AttributeKind::Typed(t) => t.clone(),
            AttributeKind::Nested(n) => n.nesting_mode.wrap(n.object_type()),
        }
    }

    /// The wire type of the attribute.
    pub fn terraform_type(&self) -> Type {
        self.attribute_type().terraform_type()
    }
}

/// A group of attributes and nested blocks.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// The attributes within this block.
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested blocks within this block.
    pub blocks: BTreeMap<String, NestedBlock>,
    /// Human-readable description of the block.
    pub description: Option<String>,
    /// Markdown description of the block.
    pub markdown_description: Option<String>,
    /// Set when the block is deprecated.
    pub deprecation_message: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the markdown description for this block.
    pub fn with_markdown_description(mut self, description: impl Into<String>) -> Self {
        self.markdown_description = Some(description.into());
        self
    }

    /// Mark this block as deprecated.
    pub fn with_deprecation_message(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = Some(message.into());
        self
    }

    /// The semantic object type of the block: attributes and nested blocks.
    pub fn attribute_type(&self) -> AttributeType {
        let mut attrs: BTreeMap<String, AttributeType> = self
            .attributes
            .iter()
            .map(|(k, a)| (k.clone(), a.attribute_type()))
            .collect();
        for (k, b) in &self.blocks {
            attrs.insert(k.clone(), b.attribute_type());
        }
        AttributeType::Object(attrs)
    }
}

/// A nested block with its nesting mode and constraints.
#[derive(Clone)]
pub struct NestedBlock {
    /// The block definition.
    pub block: Block,
    /// How the block is nested (single, list, set, map).
    pub nesting_mode: NestingMode,
    /// Minimum number of blocks required.
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    pub max_items: u32,
    /// Validators run against the block's config value.
    pub validators: Vec<Arc<dyn AttributeValidator>>,
    /// Plan modifiers run against the block's planned value.
    pub plan_modifiers: Vec<Arc<dyn AttributePlanModifier>>,
}

impl fmt::Debug for NestedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedBlock")
            .field("block", &self.block)
            .field("nesting_mode", &self.nesting_mode)
            .field("min_items", &self.min_items)
            .field("max_items", &self.max_items)
            .field("validators", &self.validators.len())
            .field("plan_modifiers", &self.plan_modifiers.len())
            .finish()
    }
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: NestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
        }
    }

    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Single, 1)
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, NestingMode::List, 0)
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Set, 0)
    }

    /// Create a map of nested blocks. Map nesting cannot be expressed on the
    /// wire and is rejected when the schema is served.
    pub fn map(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Map, 0)
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// Add a validator.
    pub fn with_validator(mut self, validator: impl AttributeValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Add a plan modifier.
    pub fn with_plan_modifier(mut self, modifier: impl AttributePlanModifier + 'static) -> Self {
        self.plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// The semantic type of the block including its nesting wrapper.
    pub fn attribute_type(&self) -> AttributeType {
        self.nesting_mode.wrap(self.block.attribute_type())
    }
}

/// Schema for a resource, data source or provider configuration.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    pub version: i64,
    /// The root block containing all attributes and nested blocks.
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: i64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for the schema.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// Set the markdown description for the schema.
    pub fn with_markdown_description(mut self, description: impl Into<String>) -> Self {
        self.block.markdown_description = Some(description.into());
        self
    }

    /// Mark the whole resource or data source as deprecated.
    pub fn with_deprecation_message(mut self, message: impl Into<String>) -> Self {
        self.block.deprecation_message = Some(message.into());
        self
    }

    /// The semantic object type of the whole schema.
    pub fn attribute_type(&self) -> AttributeType {
        self.block.attribute_type()
    }

    /// The wire type used to decode and encode values of this schema.
    pub fn terraform_type(&self) -> Type {
        self.attribute_type().terraform_type()
    }

    /// The wire type at `path`.
    pub fn type_at_path(&self, path: &Path) -> Result<Type, SchemaError> {
        let ty = self.terraform_type();
        ty.at_path(path)
            .cloned()
            .map_err(|err| SchemaError::InvalidStep {
                step: path.to_string(),
                node: err.to_string(),
            })
    }

    /// The attribute definition at `path`.
    ///
    /// Fails with [`SchemaError::PathInsideAtomicAttribute`] when the path
    /// descends into a typed attribute or names an element of a nested
    /// attribute, and with [`SchemaError::PathIsBlock`] when it ends on a
    /// block or block element.
    pub fn attribute_at_path(&self, path: &Path) -> Result<&Attribute, SchemaError> {
        if path.is_empty() {
            return Err(SchemaError::EmptyPath);
        }
        let node = path
            .steps()
            .iter()
            .try_fold(Node::Block(&self.block), |node, step| node.step(step))?;
        match node {
            Node::Attribute(attr) => Ok(attr),
            Node::NestedObject(_) => Err(SchemaError::PathInsideAtomicAttribute),
            Node::Block(_) | Node::NestedBlock(_) => Err(SchemaError::PathIsBlock),
        }
    }

    /// Validate `config` against the schema. See [`crate::validation::validate_config`].
    pub fn validate(&self, config: &Config) -> Diagnostics {
        crate::validation::validate_config(self, config)
    }
}

/// A position in the schema tree while resolving a path.
#[derive(Clone, Copy)]
enum Node<'a> {
    Block(&'a Block),
    NestedBlock(&'a NestedBlock),
    Attribute(&'a Attribute),
    NestedObject(&'a BTreeMap<String, Attribute>),
}

impl<'a> Node<'a> {
    fn step(self, step: &PathStep) -> Result<Node<'a>, SchemaError> {
        let invalid = |node: &str| SchemaError::InvalidStep {
            step: step.to_string(),
            node: node.to_string(),
        };
        match self {
            Node::Block(block) => {
                let PathStep::AttributeName(name) = step else {
                    return Err(invalid("block"));
                };
                if let Some(attr) = block.attributes.get(name) {
                    return Ok(Node::Attribute(attr));
                }
                if let Some(nested) = block.blocks.get(name) {
                    return Ok(Node::NestedBlock(nested));
                }
                Err(SchemaError::AttributeNotFound(name.clone()))
            }
            Node::NestedBlock(nested) => match nested.nesting_mode {
                NestingMode::Single => Node::Block(&nested.block).step(step),
                mode if mode.accepts(step) => Ok(Node::Block(&nested.block)),
                mode => Err(invalid(&format!("{} nested block", mode))),
            },
            Node::Attribute(attr) => match &attr.kind {
                AttributeKind::Typed(_) => Err(SchemaError::PathInsideAtomicAttribute),
                AttributeKind::Nested(nested) => match nested.nesting_mode {
                    NestingMode::Single => Node::NestedObject(&nested.attributes).step(step),
                    mode if mode.accepts(step) => Ok(Node::NestedObject(&nested.attributes)),
                    mode => Err(invalid(&format!("{} nested attribute", mode))),
                },
            },
            Node::NestedObject(attrs) => {
                let PathStep::AttributeName(name) = step else {
                    return Err(invalid("nested object"));
                };
                attrs
                    .get(name)
                    .map(Node::Attribute)
                    .ok_or_else(|| SchemaError::AttributeNotFound(name.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn network_schema() -> Schema {
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
                "ports",
                Attribute::nested(
                    NestedAttributes::list(BTreeMap::from([
                        ("number".to_string(), Attribute::required_int64()),
                        ("protocol".to_string(), Attribute::optional_string()),
                    ])),
                    AttributeFlags::optional(),
                ),
            )
            .with_block(
                "ingress",
                NestedBlock::set(Block::new().with_attribute("cidr", Attribute::required_string())),
            )
            .with_block(
                "timeouts",
                NestedBlock::single(
                    Block::new().with_attribute("create", Attribute::optional_string()),
                ),
            )
    }

    #[test]
    fn test_attribute_type_constructors() {
        let list = AttributeType::list(AttributeType::String);
        assert!(matches!(list, AttributeType::List(_)));

        let map = AttributeType::map(AttributeType::Int64);
        assert!(matches!(map, AttributeType::Map(_)));
        assert_eq!(map.terraform_type(), Type::map(Type::Number));
    }

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(!optional_computed.required);
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);

        let sensitive = AttributeFlags::required().sensitive();
        assert!(sensitive.sensitive);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("A test attribute")
            .with_deprecation_message("use other")
            .with_force_new();

        assert!(matches!(attr.kind, AttributeKind::Typed(AttributeType::String)));
        assert!(attr.flags.required);
        assert_eq!(attr.description, Some("A test attribute".to_string()));
        assert_eq!(attr.plan_modifiers.len(), 1);
    }

    #[test]
    fn test_terraform_type() {
        let ty = network_schema().terraform_type();
        let port = Type::object([("number", Type::Number), ("protocol", Type::String)]);
        let expected = Type::object([
            ("id", Type::String),
            ("ingress", Type::set(Type::object([("cidr", Type::String)]))),
            ("name", Type::String),
            ("ports", Type::list(port)),
            ("tags", Type::list(Type::String)),
            ("timeouts", Type::object([("create", Type::String)])),
        ]);
        assert_eq!(ty, expected);
    }

    #[test]
    fn test_attribute_at_path() {
        let schema = network_schema();

        let attr = schema.attribute_at_path(&Path::root("id")).unwrap();
        assert!(attr.flags.computed);

        let p = Path::root("ports").at_list_index(0).at_name("number");
        assert!(schema.attribute_at_path(&p).unwrap().flags.required);

        let p = Path::root("timeouts").at_name("create");
        assert!(schema.attribute_at_path(&p).unwrap().flags.optional);

        let p = Path::root("ingress")
            .at_set_value(Value::null(Type::object([("cidr", Type::String)])))
            .at_name("cidr");
        assert!(schema.attribute_at_path(&p).is_ok());
    }

    #[test]
    fn test_attribute_at_path_sentinels() {
        let schema = network_schema();

        let p = Path::root("tags").at_list_index(0);
        assert_eq!(
            schema.attribute_at_path(&p).unwrap_err(),
            SchemaError::PathInsideAtomicAttribute
        );

        let p = Path::root("ports").at_list_index(0);
        assert_eq!(
            schema.attribute_at_path(&p).unwrap_err(),
            SchemaError::PathInsideAtomicAttribute
        );

        assert_eq!(
            schema.attribute_at_path(&Path::root("timeouts")).unwrap_err(),
            SchemaError::PathIsBlock
        );

        assert_eq!(
            schema.attribute_at_path(&Path::root("missing")).unwrap_err(),
            SchemaError::AttributeNotFound("missing".to_string())
        );

        assert_eq!(schema.attribute_at_path(&Path::empty()).unwrap_err(), SchemaError::EmptyPath);

        let p = Path::root("ports").at_map_key("x");
        assert!(matches!(schema.attribute_at_path(&p), Err(SchemaError::InvalidStep { .. })));
    }

    #[test]
    fn test_type_at_path() {
        let schema = network_schema();
        let p = Path::root("ports").at_list_index(3).at_name("number");
        assert_eq!(schema.type_at_path(&p).unwrap(), Type::Number);
        assert!(schema.type_at_path(&Path::root("nope")).is_err());
    }

    #[test]
    fn test_tuple_attribute_type() {
        let pair = AttributeType::tuple(vec![AttributeType::String, AttributeType::Int64]);
        assert_eq!(pair.terraform_type(), Type::Tuple(vec![Type::String, Type::Number]));

        let schema =
            Schema::v0().with_attribute("pair", Attribute::new(pair, AttributeFlags::optional()));
        assert_eq!(
            schema.terraform_type(),
            Type::object([("pair", Type::Tuple(vec![Type::String, Type::Number]))])
        );
    }

    #[test]
    fn test_tuple_path_resolution() {
        let pair = AttributeType::tuple(vec![AttributeType::String, AttributeType::Bool]);
        let schema =
            Schema::v0().with_attribute("pair", Attribute::new(pair, AttributeFlags::optional()));

        assert!(schema.attribute_at_path(&Path::root("pair")).is_ok());
        assert_eq!(
            schema.attribute_at_path(&Path::root("pair").at_list_index(0)).unwrap_err(),
            SchemaError::PathInsideAtomicAttribute
        );

        assert_eq!(schema.type_at_path(&Path::root("pair").at_list_index(1)).unwrap(), Type::Bool);
        assert!(schema.type_at_path(&Path::root("pair").at_list_index(2)).is_err());
        assert!(schema.type_at_path(&Path::root("pair").at_map_key("a")).is_err());
    }

    #[test]
    fn test_nested_block_modes() {
        let single = NestedBlock::single(Block::new());
        assert_eq!(single.nesting_mode, NestingMode::Single);
        assert_eq!(single.max_items, 1);

        let list = NestedBlock::list(Block::new())
            .with_min_items(1)
            .with_max_items(5);
        assert_eq!(list.nesting_mode, NestingMode::List);
        assert_eq!(list.min_items, 1);
        assert_eq!(list.max_items, 5);
    }
}
