//! Error types for the Hemmer Provider Framework.
//!
//! Most failures inside an RPC are reported to the host as diagnostics, not
//! Rust errors. The enums here are the structural errors that the framework
//! itself raises while walking values and schemas; the orchestrator turns them
//! into diagnostics at the boundary.

use thiserror::Error;

use crate::diag::Diagnostic;
use crate::path::Path;

/// Errors raised while walking, building or converting typed values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// A path step cannot be applied to the value or type at hand.
    #[error("step {step} cannot be applied to {target}: {reason}")]
    InvalidStep {
        /// Rendering of the offending step.
        step: String,
        /// Rendering of the value or type the step was applied to.
        target: String,
        /// Why the step failed.
        reason: String,
    },

    /// A value does not match the type it was expected to have.
    #[error("type mismatch at {path}: expected {expected}, got {got}")]
    TypeMismatch {
        /// Where the mismatch happened.
        path: Path,
        /// The expected type.
        expected: String,
        /// What was found instead.
        got: String,
    },

    /// An unknown value reached a target that cannot represent it.
    #[error(
        "received unknown value at {path}, \
         however the target type cannot handle unknown values"
    )]
    Unknown {
        /// Where the unknown value sits.
        path: Path,
    },

    /// An object carried an attribute that its type does not declare.
    #[error("unsupported attribute {name:?} at {path}")]
    UnsupportedAttribute {
        /// Object path.
        path: Path,
        /// Attribute name.
        name: String,
    },

    /// A list write skipped over the next free index.
    #[error(
        "cannot add list element {index} at {path}: lists can only have the next element \
         added according to the current length ({len})"
    )]
    ListIndexOutOfRange {
        /// List path.
        path: Path,
        /// Requested index.
        index: i64,
        /// Current list length.
        len: usize,
    },

    /// Free-form conversion failure, usually from serde.
    #[error("{0}")]
    Conversion(String),
}

/// Errors raised while resolving paths against a schema or converting it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// The path descends into an element of a typed attribute. Such elements
    /// have no schema of their own.
    #[error("path leads to element of an attribute that does not have a schema")]
    PathInsideAtomicAttribute,

    /// The path resolves to a block, which is not an attribute.
    #[error("path leads to block, not an attribute")]
    PathIsBlock,

    /// No attribute or block with this name exists.
    #[error("no attribute or block named {0:?} in schema")]
    AttributeNotFound(String),

    /// A step does not fit the schema node it was applied to.
    #[error("step {step} cannot be applied to {node}")]
    InvalidStep {
        /// Rendering of the step.
        step: String,
        /// Description of the schema node.
        node: String,
    },

    /// The empty path addresses the whole schema, not an attribute.
    #[error("empty path does not address an attribute")]
    EmptyPath,

    /// The schema definition itself is invalid.
    #[error("{path}: {message}")]
    InvalidDefinition {
        /// Location of the bad definition.
        path: Path,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors raised while decoding or encoding wire dynamic values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The msgpack payload could not be decoded.
    #[error("msgpack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    /// The value could not be encoded as msgpack.
    #[error("msgpack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    /// The JSON payload could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dynamic value carried no payload at all.
    #[error("DynamicValue had no JSON or msgpack data set")]
    Empty,

    /// Raw state was only available in the legacy flatmap format.
    #[error(
        "flatmap states cannot be unmarshaled, \
         only states written by Terraform 0.12 and higher can be unmarshaled"
    )]
    Flatmap,

    /// The payload decoded but does not fit the requested type.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Errors that provider implementations commonly raise from their own code.
///
/// Callbacks report problems through diagnostics; `ProviderError` converts
/// into an error [`Diagnostic`] so API client failures can be surfaced with
/// `resp.diagnostics.push(err.into())`.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The remote object already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The backing API refused the credentials.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backing API is temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The provider has not been configured correctly.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input failed provider-side validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation observed cancellation through its context.
    #[error("Operation cancelled")]
    Cancelled,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::AlreadyExists(msg)
            | Self::PermissionDenied(msg)
            | Self::Unavailable(msg)
            | Self::Configuration(msg)
            | Self::Validation(msg) => msg,
            Self::Cancelled => "operation cancelled",
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Resource Not Found",
            Self::AlreadyExists(_) => "Resource Already Exists",
            Self::PermissionDenied(_) => "Permission Denied",
            Self::Unavailable(_) => "Service Unavailable",
            Self::Configuration(_) => "Provider Configuration Error",
            Self::Validation(_) => "Validation Error",
            Self::Cancelled => "Operation Cancelled",
            Self::Serialization(_) => "Serialization Error",
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::error(err.summary(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Severity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("resource-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: resource-123");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::Cancelled;
        assert_eq!(format!("{}", err), "Operation cancelled");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::NotFound("resource-123".to_string());
        assert_eq!(err.message(), "resource-123");

        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");
    }

    #[test]
    fn test_provider_error_to_diagnostic() {
        let diag: Diagnostic = ProviderError::AlreadyExists("bucket-1".to_string()).into();
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.summary, "Resource Already Exists");
        assert_eq!(diag.detail, "Resource already exists: bucket-1");
        assert!(diag.path.is_none());
    }

    #[test]
    fn test_schema_error_sentinels_are_distinct() {
        assert_ne!(SchemaError::PathInsideAtomicAttribute, SchemaError::PathIsBlock);
        assert_eq!(
            SchemaError::AttributeNotFound("name".to_string()).to_string(),
            "no attribute or block named \"name\" in schema"
        );
    }

    #[test]
    fn test_list_index_error_display() {
        let err = ValueError::ListIndexOutOfRange {
            path: Path::root("tags"),
            index: 3,
            len: 1,
        };
        assert!(err.to_string().contains("lists can only have the next element added"));
        assert!(err.to_string().starts_with("cannot add list element 3 at tags"));
    }
}
