//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::DeidConfig;
use crate::core::pipeline::FailurePolicy;
use crate::domain::{ConfigError, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// Loads the application configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into DeidConfig
/// 4. Applies environment variable overrides (DEID_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or parsed, a referenced
/// environment variable is not set, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use deid::config::loader::load_config;
///
/// let config = load_config("deid.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<DeidConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::Parse(format!(
            "Configuration file not found: {}",
            path.display()
        ))
        .into());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ConfigError::Parse(format!(
            "Failed to read configuration file {}: {e}",
            path.display()
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: DeidConfig = toml::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config
        .validate()
        .map_err(|e| ConfigError::Parse(format!("Configuration validation failed: {e}")))?;

    Ok(config)
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid placeholder regex"))
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched. Every missing variable is reported at once.
pub(crate) fn substitute_env_vars(input: &str) -> std::result::Result<String, ConfigError> {
    let re = placeholder_regex();
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ConfigError::Parse(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Reads and parses an override variable; unset means no override
fn env_override<T: FromStr>(name: &str) -> std::result::Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidParameter {
            name: name.to_string(),
            message: format!("cannot parse '{raw}'"),
        })
}

/// Applies environment variable overrides using the DEID_* prefix
///
/// Variables follow the pattern DEID_<SECTION>_<KEY>, for example
/// DEID_PIPELINE_BATCH_SIZE or DEID_APPLICATION_LOG_LEVEL.
fn apply_env_overrides(config: &mut DeidConfig) -> std::result::Result<(), ConfigError> {
    // Application overrides
    if let Some(val) = env_override("DEID_APPLICATION_LOG_LEVEL")? {
        config.application.log_level = val;
    }

    // Pipeline overrides
    if let Some(val) = env_override("DEID_PIPELINE_BATCH_SIZE")? {
        config.pipeline.batch_size = val;
    }
    if let Some(val) = env_override("DEID_PIPELINE_CONCURRENCY")? {
        config.pipeline.concurrency = val;
    }
    if let Some(val) = env_override("DEID_PIPELINE_KEEP_ORDER")? {
        config.pipeline.keep_order = val;
    }
    if let Some(val) = env_override::<String>("DEID_PIPELINE_ON_ITEM_ERROR")? {
        config.pipeline.on_item_error = match val.to_lowercase().as_str() {
            "abort" => FailurePolicy::Abort,
            "skip" => FailurePolicy::Skip,
            _ => {
                return Err(ConfigError::InvalidParameter {
                    name: "DEID_PIPELINE_ON_ITEM_ERROR".to_string(),
                    message: format!("'{val}' must be one of: abort, skip"),
                })
            }
        };
    }

    // De-identification overrides
    if let Some(val) = env_override::<String>("DEID_DEIDENTIFICATION_RULES_PATH")? {
        config.deidentification.rules_path = val.into();
    }
    if let Some(val) = env_override("DEID_DEIDENTIFICATION_FAMILY")? {
        config.deidentification.family = val;
    }

    // Audit overrides
    if let Some(val) = env_override("DEID_AUDIT_ENABLED")? {
        config.audit.enabled = val;
    }
    if let Some(val) = env_override::<String>("DEID_AUDIT_LOG_PATH")? {
        config.audit.log_path = val.into();
    }
    if let Some(val) = env_override("DEID_AUDIT_JSON_FORMAT")? {
        config.audit.json_format = val;
    }

    // Logging overrides
    if let Some(val) = env_override("DEID_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env_override("DEID_LOGGING_LOCAL_PATH")? {
        config.logging.local_path = val;
    }
    if let Some(val) = env_override("DEID_LOGGING_LOCAL_ROTATION")? {
        config.logging.local_rotation = val;
    }

    Ok(())
}
