//! Config validation.
//!
//! [`validate_config`] walks a schema alongside a decoded [`Config`]. It
//! checks attribute definitions, runs declared validators, enforces item
//! limits for nested attributes and blocks, and emits deprecation warnings.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_framework::data::Config;
//! use hemmer_provider_framework::schema::{Attribute, Schema};
//! use hemmer_provider_framework::validation::validate_config;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("count", Attribute::optional_int64());
//!
//! let mut config = Config::null(schema.clone());
//! assert!(!config.set(&json!({"name": "test", "count": 42})).has_error());
//! assert!(validate_config(&schema, &config).is_empty());
//! ```

use crate::data::Config;
use crate::diag::Diagnostics;
use crate::path::Path;
use crate::schema::{Attribute, AttributeKind, Block, NestedBlock, NestingMode, Schema};
use crate::value::Value;

/// Checks a single attribute's config value.
pub trait AttributeValidator: Send + Sync {
    /// Plain text description of what the validator enforces.
    fn description(&self) -> String;

    /// Markdown description of what the validator enforces.
    fn markdown_description(&self) -> String {
        self.description()
    }

    /// Validate the value. Returned diagnostics should carry `req.path`.
    fn validate(&self, req: &ValidateAttributeRequest<'_>) -> Diagnostics;
}

/// Input to an [`AttributeValidator`].
#[derive(Debug)]
pub struct ValidateAttributeRequest<'a> {
    /// Path of the attribute being validated.
    pub path: Path,
    /// The attribute's config value. May be null or unknown.
    pub config_value: Value,
    /// The whole configuration, for cross-attribute checks.
    pub config: &'a Config,
}

/// Checks a whole configuration, typically relationships between attributes.
pub trait ConfigValidator: Send + Sync {
    /// Plain text description of what the validator enforces.
    fn description(&self) -> String;

    /// Markdown description of what the validator enforces.
    fn markdown_description(&self) -> String {
        self.description()
    }

    /// Validate the configuration.
    fn validate(&self, config: &Config) -> Diagnostics;
}

/// Validate `config` against `schema`.
///
/// # Validation Rules
///
/// - Every attribute must be Required, Optional or Computed
/// - Required attributes left null are not reported; the host enforces them
/// - Declared validators run for every attribute and nested block
/// - Nested attributes and blocks are validated element by element, with
///   min/max item constraints checked on known values
/// - Deprecated attributes and blocks warn only when configured
pub fn validate_config(schema: &Schema, config: &Config) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    validate_block(&schema.block, &Path::empty(), config, &mut diagnostics);

    if let Some(message) = &schema.block.deprecation_message {
        diagnostics.add_warning("Deprecated", message.clone());
    }
    diagnostics
}

fn validate_block(block: &Block, path: &Path, config: &Config, diagnostics: &mut Diagnostics) {
    for (name, attr) in &block.attributes {
        validate_attribute(attr, &path.at_name(name.clone()), config, diagnostics);
    }
    for (name, nested) in &block.blocks {
        validate_nested_block(nested, &path.at_name(name.clone()), config, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    path: &Path,
    config: &Config,
    diagnostics: &mut Diagnostics,
) {
    if !attr.flags.required && !attr.flags.optional && !attr.flags.computed {
        diagnostics.add_attribute_error(
            path.clone(),
            "Invalid Attribute Definition",
            "Attribute missing Required, Optional, or Computed definition. This is always a \
             problem with the provider and should be reported to the provider developer.",
        );
        return;
    }

    let value = match config.value_at_path(path) {
        Ok(value) => value,
        Err(diags) => {
            diagnostics.append(diags);
            return;
        }
    };

    run_validators(&attr.validators, path, &value, config, diagnostics);

    if let AttributeKind::Nested(nested) = &attr.kind {
        if !value.is_null() && value.is_known() {
            check_item_limits(
                "Invalid Attribute Value",
                "Attribute",
                nested.nesting_mode,
                nested.min_items,
                nested.max_items,
                path,
                &value,
                diagnostics,
            );
            for element_path in element_paths(nested.nesting_mode, path, &value) {
                for (name, nested_attr) in &nested.attributes {
                    validate_attribute(
                        nested_attr,
                        &element_path.at_name(name.clone()),
                        config,
                        diagnostics,
                    );
                }
            }
        }
    }

    if let Some(message) = &attr.deprecation_message {
        if !value.is_null() {
            diagnostics.add_attribute_warning(
                path.clone(),
                "Attribute Deprecated",
                message.clone(),
            );
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    path: &Path,
    config: &Config,
    diagnostics: &mut Diagnostics,
) {
    let value = match config.value_at_path(path) {
        Ok(value) => value,
        Err(diags) => {
            diagnostics.append(diags);
            return;
        }
    };

    run_validators(&nested.validators, path, &value, config, diagnostics);

    if value.is_known() {
        check_item_limits(
            "Invalid Block",
            "Block",
            nested.nesting_mode,
            nested.min_items,
            nested.max_items,
            path,
            &value,
            diagnostics,
        );
        for element_path in element_paths(nested.nesting_mode, path, &value) {
            validate_block(&nested.block, &element_path, config, diagnostics);
        }
    }

    if let Some(message) = &nested.block.deprecation_message {
        if !value.is_null() {
            diagnostics.add_attribute_warning(path.clone(), "Block Deprecated", message.clone());
        }
    }
}

fn run_validators(
    validators: &[std::sync::Arc<dyn AttributeValidator>],
    path: &Path,
    value: &Value,
    config: &Config,
    diagnostics: &mut Diagnostics,
) {
    if validators.is_empty() {
        return;
    }
    let req = ValidateAttributeRequest {
        path: path.clone(),
        config_value: value.clone(),
        config,
    };
    for validator in validators {
        tracing::debug!(
            attribute_path = %path,
            description = %validator.description(),
            "Calling provider defined AttributeValidator"
        );
        diagnostics.append(validator.validate(&req));
        tracing::debug!(attribute_path = %path, "Called provider defined AttributeValidator");
    }
}

/// Paths of the nested objects held by a known, non-null value.
fn element_paths(mode: NestingMode, path: &Path, value: &Value) -> Vec<Path> {
    if value.is_null() || value.is_unknown() {
        return Vec::new();
    }
    match mode {
        NestingMode::Single => vec![path.clone()],
        NestingMode::List => value
            .elements()
            .map(|elems| (0..elems.len()).map(|i| path.at_list_index(i as i64)).collect())
            .unwrap_or_default(),
        NestingMode::Set => value
            .elements()
            .map(|elems| elems.iter().map(|e| path.at_set_value(e.clone())).collect())
            .unwrap_or_default(),
        NestingMode::Map => value
            .entries()
            .map(|entries| entries.keys().map(|k| path.at_map_key(k.clone())).collect())
            .unwrap_or_default(),
    }
}

#[allow(clippy::too_many_arguments)]
fn check_item_limits(
    summary: &str,
    noun: &str,
    mode: NestingMode,
    min_items: u32,
    max_items: u32,
    path: &Path,
    value: &Value,
    diagnostics: &mut Diagnostics,
) {
    let count = match mode {
        _ if value.is_null() => 0,
        NestingMode::Single => 1,
        NestingMode::List | NestingMode::Set => value.elements().map_or(0, <[Value]>::len),
        NestingMode::Map => value.entries().map_or(0, |e| e.len()),
    };

    if (count as u64) < u64::from(min_items) {
        diagnostics.add_attribute_error(
            path.clone(),
            summary,
            format!("{} {} requires at least {} item(s), got {}", noun, path, min_items, count),
        );
    }

    // 0 means unlimited
    if max_items > 0 && (count as u64) > u64::from(max_items) {
        diagnostics.add_attribute_error(
            path.clone(),
            summary,
            format!("{} {} allows at most {} item(s), got {}", noun, path, max_items, count),
        );
    }
}
