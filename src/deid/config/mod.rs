//! De-identification configuration: parsing, validation and resolution
//!
//! A [`DeidConfiguration`] is built once from a rule document and then shared
//! read-only by every worker. The only mutation allowed after load is the
//! date-shift scope prefix, applied before a run starts.
//!
//! # Example
//!
//! ```rust
//! use deid::deid::config::DeidConfiguration;
//!
//! let config = DeidConfiguration::from_toml_str(r#"
//! [parameters]
//! date_shift_range = 30
//!
//! [[rules]]
//! path = "Patient.name"
//! method = "redact"
//! "#).unwrap();
//!
//! assert_eq!(config.rules().len(), 1);
//! assert_eq!(config.parameters().date_shift_range, 30);
//! ```

pub mod file;
pub mod parameters;
pub mod settings;

pub use file::{ConfigFormat, RawDeidConfig, RawRule};
pub use parameters::{DateShiftScope, DeidParameters, ErrorPolicy, IdentifierStrategy, RawParameters};
pub use settings::SettingMap;

use crate::config::loader::substitute_env_vars;
use crate::deid::processors::ProcessorRegistry;
use crate::deid::rules::{compile_rules, Rule};
use crate::deid::tags::TagRuleSet;
use crate::domain::{ConfigError, RecordFamily};
use std::fs;
use std::path::Path;

/// Validated, immutable engine configuration
#[derive(Debug, Clone)]
pub struct DeidConfiguration {
    parameters: DeidParameters,
    rules: Vec<Rule>,
    tag_rules: TagRuleSet,
}

impl DeidConfiguration {
    /// Resolves a parsed document with a registry of extension methods
    pub fn load(raw: RawDeidConfig, registry: &ProcessorRegistry) -> Result<Self, ConfigError> {
        let (rules, tag_rules) = compile_rules(&raw, registry)?;
        let parameters = raw.parameters.resolve()?;

        if !parameters.generated_keys.is_empty() {
            tracing::info!(
                keys = ?parameters.generated_keys,
                "Generated random keys for absent key parameters"
            );
        }
        tracing::debug!(rules = rules.len(), "De-identification configuration loaded");

        Ok(Self {
            parameters,
            rules,
            tag_rules,
        })
    }

    pub fn from_str_with(
        text: &str,
        format: ConfigFormat,
        registry: &ProcessorRegistry,
    ) -> Result<Self, ConfigError> {
        Self::load(RawDeidConfig::parse(text, format)?, registry)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_str_with(text, ConfigFormat::Toml, &ProcessorRegistry::new())
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_str_with(text, ConfigFormat::Json, &ProcessorRegistry::new())
    }

    /// Loads a TOML or JSON rule file, substituting `${VAR}` placeholders first
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_registry(path, &ProcessorRegistry::new())
    }

    pub fn from_file_with_registry(
        path: impl AsRef<Path>,
        registry: &ProcessorRegistry,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ConfigError::Parse(format!(
                "Failed to read rule configuration {}: {e}",
                path.display()
            ))
        })?;
        let text = substitute_env_vars(&text)?;
        Self::from_str_with(&text, ConfigFormat::from_path(path), registry)
    }

    pub fn parameters(&self) -> &DeidParameters {
        &self.parameters
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    /// Rules of one record family, in declaration order
    pub fn rules_for(&self, family: RecordFamily) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.family() == family)
    }

    pub fn tag_rules(&self) -> &TagRuleSet {
        &self.tag_rules
    }

    /// Replaces the date-shift key prefix (file or folder name) before a run
    pub fn set_scope_prefix(&mut self, prefix: impl Into<String>) {
        self.parameters.date_shift_key_prefix = prefix.into();
    }

    pub fn with_scope_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.set_scope_prefix(prefix);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_generated_keys_are_stable_for_instance() {
        let config = DeidConfiguration::from_toml_str("").unwrap();
        let clone = config.clone();
        assert_eq!(
            config.parameters().date_shift_key.expose_secret().as_bytes(),
            clone.parameters().date_shift_key.expose_secret().as_bytes()
        );
        assert_eq!(config.parameters().generated_keys.len(), 3);
    }

    #[test]
    fn test_scope_prefix_override() {
        let config = DeidConfiguration::from_toml_str("").unwrap().with_scope_prefix("study-42");
        assert_eq!(config.parameters().date_shift_key_prefix, "study-42");
    }

    #[test]
    fn test_rules_for_family() {
        let config = DeidConfiguration::from_json_str(
            r#"{"rules": [
                {"path": "Patient.name", "method": "redact"},
                {"tag": "(0010,0010)", "method": "redact"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.rules_for(RecordFamily::Path).count(), 1);
        assert_eq!(config.rules_for(RecordFamily::Tag).count(), 1);
        assert!(!config.tag_rules().is_empty());
    }

    #[test]
    fn test_from_file_substitutes_env_vars() {
        std::env::set_var("DEID_TEST_RULES_SHIFT_KEY", "from-env");
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[parameters]\n# placeholder ${{NOT_SET_ANYWHERE}} in a comment\ndate_shift_key = \"${{DEID_TEST_RULES_SHIFT_KEY}}\""
        )
        .unwrap();

        let config = DeidConfiguration::from_file(file.path()).unwrap();
        assert_eq!(
            config.parameters().date_shift_key.expose_secret().as_bytes(),
            b"from-env"
        );
        std::env::remove_var("DEID_TEST_RULES_SHIFT_KEY");
    }

    #[test]
    fn test_from_file_missing_env_var() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[parameters]\ncrypto_hash_key = \"${{DEID_TEST_DEFINITELY_MISSING}}\"").unwrap();
        let err = DeidConfiguration::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("DEID_TEST_DEFINITELY_MISSING"));
    }
}
