//! Transformation processors
//!
//! Each de-identification method is a [`Processor`]. Built-in methods are resolved at
//! configuration load into the closed [`RuleProcessor`] enum; extension methods are
//! looked up in a [`ProcessorRegistry`] and wrapped as [`RuleProcessor::Custom`].
//! Structural methods (`keep`, `remove`, `substitute`) need the visited-node set and
//! are applied by the traversal visitor; the rest rewrite one node value at a time.

pub mod crypto_hash;
pub mod date_shift;
pub mod encrypt;
pub mod generalize;
pub mod perturb;
pub mod redact;
pub mod regenerate;
pub mod substitute;

pub use crypto_hash::CryptoHashProcessor;
pub use date_shift::DateShiftProcessor;
pub use encrypt::EncryptProcessor;
pub use generalize::GeneralizeProcessor;
pub use perturb::PerturbProcessor;
pub use redact::RedactProcessor;
pub use regenerate::RegenerateIdProcessor;
pub use substitute::SubstituteProcessor;

use crate::deid::config::parameters::DeidParameters;
use crate::deid::config::settings::{typed, SettingMap};
use crate::deid::datetime::PartialDateTime;
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError, RecordFamily};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-invocation context handed to processors
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub params: &'a DeidParameters,
    pub family: RecordFamily,
    /// Identifier of the enclosing resource (record id or patient id)
    pub scope_id: &'a str,
    /// Instance type of the processed node's parent
    pub parent_type: Option<&'a str>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(params: &'a DeidParameters, family: RecordFamily, scope_id: &'a str) -> Self {
        Self {
            params,
            family,
            scope_id,
            parent_type: None,
        }
    }

    pub fn with_parent(&self, parent_type: Option<&'a str>) -> Self {
        Self {
            parent_type,
            ..*self
        }
    }
}

/// A value-rewriting de-identification method
pub trait Processor: Send + Sync + fmt::Debug {
    /// Method name as used in configuration
    fn name(&self) -> &str;

    /// Whether this method can rewrite the node's value
    fn applies_to(&self, node: &Node, ctx: &ProcessContext<'_>) -> bool;

    /// Rewrites the node's value in place
    fn process(&self, node: &mut Node, ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError>;
}

/// Builds an extension processor from its merged settings
pub type ProcessorFactory =
    Arc<dyn Fn(&SettingMap) -> Result<Arc<dyn Processor>, String> + Send + Sync>;

/// Registration table for extension methods
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("methods", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension method; names are normalized like built-ins
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&SettingMap) -> Result<Arc<dyn Processor>, String> + Send + Sync + 'static,
    {
        self.factories.insert(normalize_method(name), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<&ProcessorFactory> {
        self.factories.get(&normalize_method(name))
    }
}

/// Lowercases and strips `_`/`-` so `dateShift`, `date_shift` and `dateshift` agree
pub fn normalize_method(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Why a method could not be resolved
#[derive(Debug)]
pub enum BuildError {
    Unsupported,
    Setting(String),
    Expression(String),
}

/// A rule's resolved method
#[derive(Debug, Clone)]
pub enum RuleProcessor {
    Redact(RedactProcessor),
    DateShift(DateShiftProcessor),
    CryptoHash(CryptoHashProcessor),
    Encrypt(EncryptProcessor),
    Perturb(PerturbProcessor),
    Substitute(SubstituteProcessor),
    Generalize(GeneralizeProcessor),
    Keep,
    Remove,
    RegenerateId(RegenerateIdProcessor),
    Custom(Arc<dyn Processor>),
}

impl RuleProcessor {
    /// Resolves a method name and its merged settings
    pub fn build(
        method: &str,
        settings: &SettingMap,
        family: RecordFamily,
        registry: &ProcessorRegistry,
    ) -> Result<Self, BuildError> {
        Ok(match normalize_method(method).as_str() {
            "redact" => {
                let s = typed(settings).map_err(BuildError::Setting)?;
                Self::Redact(RedactProcessor::new(s).map_err(BuildError::Setting)?)
            }
            "dateshift" => {
                let s = typed(settings).map_err(BuildError::Setting)?;
                Self::DateShift(DateShiftProcessor::new(s).map_err(BuildError::Setting)?)
            }
            "cryptohash" => Self::CryptoHash(CryptoHashProcessor::new(
                typed(settings).map_err(BuildError::Setting)?,
            )),
            "encrypt" => {
                if !settings.is_empty() {
                    return Err(BuildError::Setting("encrypt takes no settings".to_string()));
                }
                Self::Encrypt(EncryptProcessor)
            }
            "perturb" => {
                let s = typed(settings).map_err(BuildError::Setting)?;
                Self::Perturb(PerturbProcessor::new(s).map_err(BuildError::Setting)?)
            }
            "substitute" => {
                let s = typed(settings).map_err(BuildError::Setting)?;
                Self::Substitute(SubstituteProcessor::new(s).map_err(BuildError::Setting)?)
            }
            "generalize" => {
                let s = typed(settings).map_err(BuildError::Setting)?;
                Self::Generalize(GeneralizeProcessor::new(s)?)
            }
            "keep" => Self::Keep,
            "remove" => Self::Remove,
            "regenerateid" | "refreshuid" => {
                if family != RecordFamily::Tag {
                    return Err(BuildError::Setting(
                        "regenerate_id only applies to tag rules".to_string(),
                    ));
                }
                Self::RegenerateId(RegenerateIdProcessor)
            }
            other => match registry.get(other) {
                Some(factory) => {
                    Self::Custom(factory(settings).map_err(BuildError::Setting)?)
                }
                None => return Err(BuildError::Unsupported),
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Redact(p) => p.name(),
            Self::DateShift(p) => p.name(),
            Self::CryptoHash(p) => p.name(),
            Self::Encrypt(p) => p.name(),
            Self::Perturb(p) => p.name(),
            Self::Substitute(_) => "substitute",
            Self::Generalize(p) => p.name(),
            Self::Keep => "keep",
            Self::Remove => "remove",
            Self::RegenerateId(p) => p.name(),
            Self::Custom(p) => p.name(),
        }
    }

    /// The value-rewriting processor, for every method except the structural ones
    pub fn value_processor(&self) -> Option<&dyn Processor> {
        match self {
            Self::Redact(p) => Some(p),
            Self::DateShift(p) => Some(p),
            Self::CryptoHash(p) => Some(p),
            Self::Encrypt(p) => Some(p),
            Self::Perturb(p) => Some(p),
            Self::Generalize(p) => Some(p),
            Self::RegenerateId(p) => Some(p),
            Self::Custom(p) => Some(p.as_ref()),
            Self::Substitute(_) | Self::Keep | Self::Remove => None,
        }
    }
}

/// Applies a value processor to a rule's target node
///
/// A valued node the processor cannot handle is a type mismatch; a valueless
/// container is left for the descendant pass.
pub fn apply_checked(
    processor: &dyn Processor,
    node: &mut Node,
    ctx: &ProcessContext<'_>,
) -> Result<ProcessResult, ProcessingError> {
    if !processor.applies_to(node, ctx) {
        if node.value.is_none() {
            return Ok(ProcessResult::default());
        }
        return Err(ProcessingError::TypeMismatch {
            method: processor.name().to_string(),
            location: node.location.clone(),
            instance_type: node.instance_type.clone(),
        });
    }
    processor.process(node, ctx)
}

const DATE_TYPES: &[&str] = &["date", "dateTime", "instant", "DA", "DT"];
const INTEGER_TYPES: &[&str] = &[
    "integer", "positiveInt", "unsignedInt", "integer64", "IS", "US", "SS", "UL", "SL", "UV", "SV",
];
const DECIMAL_TYPES: &[&str] = &["decimal", "DS", "FL", "FD"];
const NON_STRING_TYPES: &[&str] = &["boolean", "time", "TM", "AS", "SQ", "OB", "OW", "OF", "UN"];

pub fn is_date_type(instance_type: &str) -> bool {
    DATE_TYPES.contains(&instance_type)
}

pub fn is_integer_type(instance_type: &str) -> bool {
    INTEGER_TYPES.contains(&instance_type)
}

pub fn is_numeric_type(instance_type: &str) -> bool {
    is_integer_type(instance_type) || DECIMAL_TYPES.contains(&instance_type)
}

/// Types whose values may be replaced by arbitrary text
pub fn is_string_like(instance_type: &str) -> bool {
    !is_date_type(instance_type)
        && !is_numeric_type(instance_type)
        && !NON_STRING_TYPES.contains(&instance_type)
}

/// Parses a node value as a date in the notation its type implies
pub fn parse_node_date(node: &Node) -> Option<PartialDateTime> {
    let value = node.value.as_deref()?;
    match node.instance_type.as_str() {
        "DA" => PartialDateTime::parse_dicom_date(value),
        "DT" => PartialDateTime::parse_dicom_datetime(value),
        _ => PartialDateTime::parse_iso(value),
    }
}
