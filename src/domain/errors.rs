//! Domain error types
//!
//! This module defines the error hierarchy for deid. Configuration errors are always
//! fatal at load time, processing errors are subject to the configured `on_error`
//! policy, and pipeline errors abort a batch run. All errors are domain-specific and
//! don't expose third-party types.

use thiserror::Error;

/// Main deid error type
///
/// This is the primary error type used throughout the library.
/// It wraps the specific error families and provides context for error handling.
#[derive(Debug, Error)]
pub enum DeidError {
    /// Rule or parameter configuration errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Errors raised while applying rules to a record
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Batch pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl DeidError {
    /// Returns true if this error is subject to the per-record error policy
    pub fn is_processing(&self) -> bool {
        matches!(self, DeidError::Processing(_))
    }
}

/// Configuration errors
///
/// Every variant that concerns a rule carries the rule index (declaration order,
/// zero-based) and its selector source so the offending rule can be reported.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration text could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A rule declares neither a path, type, tag nor VR selector
    #[error("Rule #{index} has no selector (expected one of path, type, tag, vr)")]
    MissingSelector { index: usize },

    /// A rule declares more than one selector
    #[error("Rule #{index} declares more than one selector: {source_text}")]
    AmbiguousSelector { index: usize, source_text: String },

    /// The method name is not a built-in and not registered
    #[error("Rule #{index} ({source_text}) uses unsupported method '{method}'")]
    UnsupportedMethod {
        index: usize,
        source_text: String,
        method: String,
    },

    /// A selector or setting expression failed to compile
    #[error("Rule #{index} ({source_text}) has an invalid expression: {message}")]
    InvalidExpression {
        index: usize,
        source_text: String,
        message: String,
    },

    /// A merged setting object failed validation
    #[error("Rule #{index} ({source_text}) has an invalid setting: {message}")]
    InvalidSetting {
        index: usize,
        source_text: String,
        message: String,
    },

    /// A rule references a customized setting that does not exist
    #[error("Rule #{index} ({source_text}) references unknown setting '{setting}'")]
    UnknownSetting {
        index: usize,
        source_text: String,
        setting: String,
    },

    /// A tag rule names a tag that cannot be parsed or found in the dictionary
    #[error("Rule #{index} references unknown tag '{tag}'")]
    UnknownTag { index: usize, tag: String },

    /// A global parameter is out of range or malformed
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },
}

/// Errors raised while processing a single record
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The method cannot be applied to the node's value type
    #[error("Method '{method}' cannot be applied to {location} of type '{instance_type}'")]
    TypeMismatch {
        method: String,
        location: String,
        instance_type: String,
    },

    /// A matched tag-family element has no VR and is not in the dictionary
    #[error("Unknown tag at {location}: {tag}")]
    UnknownTag { location: String, tag: String },

    /// The method is not applicable to this record family
    #[error("Method '{method}' is not applicable at {location}")]
    MethodNotApplicable { method: String, location: String },

    /// Expression evaluation failed at runtime
    #[error("Expression evaluation failed at {location}: {message}")]
    Expression { location: String, message: String },

    /// A cryptographic primitive failed
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Output validation rejected the de-identified record
    #[error("Output validation failed at {location}: {message}")]
    ValidationFailed { location: String, message: String },
}

/// Batch pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The record reader failed
    #[error("Reader failed: {0}")]
    Reader(String),

    /// The batch consumer failed
    #[error("Writer failed: {0}")]
    Writer(String),

    /// An item transform failed and the failure policy is abort
    #[error("Item {index} failed: {message}")]
    Item { index: u64, message: String },

    /// A worker task panicked or was aborted
    #[error("Worker failed: {0}")]
    Worker(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for DeidError {
    fn from(err: std::io::Error) -> Self {
        DeidError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DeidError {
    fn from(err: serde_json::Error) -> Self {
        DeidError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DeidError {
    fn from(err: toml::de::Error) -> Self {
        DeidError::Configuration(ConfigError::Parse(format!("TOML parse error: {err}")))
    }
}
