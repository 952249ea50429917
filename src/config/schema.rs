//! Application configuration schema
//!
//! Maps `deid.toml`. The rule set itself lives in a separate file referenced by
//! `[deidentification] rules_path` and is loaded by [`crate::deid::config`].

use crate::core::pipeline::{FailurePolicy, PipelineOptions};
use crate::domain::RecordFamily;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeidConfig {
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Batch executor settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    pub deidentification: DeidentificationConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeidConfig {
    /// Validates every section
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid key
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.pipeline.validate()?;
        self.deidentification.validate()?;
        self.audit.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Batch executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per batch (1-10000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker tasks (1-256)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Write output in input order
    #[serde(default = "default_true")]
    pub keep_order: bool,

    /// What to do with a record that fails: abort the run or skip the record
    #[serde(default)]
    pub on_item_error: FailurePolicy,
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 || self.batch_size > 10000 {
            return Err("pipeline.batch_size must be between 1 and 10000".to_string());
        }
        if self.concurrency == 0 || self.concurrency > 256 {
            return Err("pipeline.concurrency must be between 1 and 256".to_string());
        }
        Ok(())
    }

    pub fn to_options(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            keep_order: self.keep_order,
            on_item_error: self.on_item_error,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            keep_order: true,
            on_item_error: FailurePolicy::default(),
        }
    }
}

/// Rule file and record family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeidentificationConfig {
    /// Rule configuration file (TOML or JSON), relative to the working directory
    pub rules_path: PathBuf,

    /// Record family of the input (path or tag)
    #[serde(default = "default_family")]
    pub family: RecordFamily,
}

impl DeidentificationConfig {
    fn validate(&self) -> Result<(), String> {
        if self.rules_path.as_os_str().is_empty() {
            return Err("deidentification.rules_path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,

    /// One JSON object per line instead of plain text
    #[serde(default = "default_true")]
    pub json_format: bool,
}

impl AuditConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enabled && self.log_path.as_os_str().is_empty() {
            return Err("audit.log_path is required when audit is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_log_path(),
            json_format: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_family() -> RecordFamily {
    RecordFamily::Path
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("./audit/deid.log")
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_validation() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        config.batch_size = 0;
        assert!(config.validate().is_err());

        config.batch_size = 10001;
        assert!(config.validate().is_err());

        config.batch_size = 10000;
        config.concurrency = 257;
        assert!(config.validate().is_err());

        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_options_mapping() {
        let config = PipelineConfig {
            batch_size: 7,
            concurrency: 3,
            keep_order: false,
            on_item_error: FailurePolicy::Skip,
        };
        let options = config.to_options();
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.concurrency, 3);
        assert!(!options.keep_order);
        assert_eq!(options.on_item_error, FailurePolicy::Skip);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: DeidConfig = toml::from_str(
            r#"
[deidentification]
rules_path = "rules.toml"
"#,
        )
        .unwrap();

        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.pipeline.batch_size, 100);
        assert!(config.pipeline.keep_order);
        assert_eq!(config.deidentification.family, RecordFamily::Path);
        assert!(!config.audit.enabled);
        assert!(!config.logging.local_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = LoggingConfig::default();
        assert_eq!(config.local_rotation, "daily");
        assert!(config.validate().is_ok());

        config.local_rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_on_item_error_parses_lowercase() {
        let config: PipelineConfig = toml::from_str("on_item_error = \"skip\"").unwrap();
        assert_eq!(config.on_item_error, FailurePolicy::Skip);
    }
}
