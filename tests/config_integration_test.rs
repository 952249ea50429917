//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables hold ENV_MUTEX to avoid
//! interference between tests.

use deid::config::load_config;
use deid::core::pipeline::FailurePolicy;
use deid::deid::config::{DateShiftScope, IdentifierStrategy};
use deid::deid::DeidConfiguration;
use deid::domain::{ConfigError, DeidError, RecordFamily};
use std::io::Write;
use std::sync::Mutex;
use tempfile::{NamedTempFile, TempDir};

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Helper function to clean up environment variables
fn cleanup_env_vars() {
    std::env::remove_var("DEID_APPLICATION_LOG_LEVEL");
    std::env::remove_var("DEID_PIPELINE_BATCH_SIZE");
    std::env::remove_var("DEID_PIPELINE_ON_ITEM_ERROR");
    std::env::remove_var("DEID_DEIDENTIFICATION_FAMILY");
    std::env::remove_var("TEST_DEID_RULES_DIR");
    std::env::remove_var("TEST_DEID_DATE_KEY");
}

fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_temp(
        r#"
[application]
log_level = "debug"

[pipeline]
batch_size = 250
concurrency = 8
keep_order = false
on_item_error = "skip"

[deidentification]
rules_path = "rules/hospital.toml"
family = "tag"

[audit]
enabled = true
log_path = "./audit/run.log"
json_format = false

[logging]
local_enabled = true
local_path = "/var/log/deid"
local_rotation = "hourly"
"#,
        ".toml",
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.pipeline.batch_size, 250);
    assert_eq!(config.pipeline.concurrency, 8);
    assert!(!config.pipeline.keep_order);
    assert_eq!(config.pipeline.on_item_error, FailurePolicy::Skip);
    assert_eq!(config.deidentification.family, RecordFamily::Tag);
    assert!(config.audit.enabled);
    assert!(!config.audit.json_format);
    assert!(config.logging.local_enabled);
    assert_eq!(config.logging.local_rotation, "hourly");
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_temp("[deidentification]\nrules_path = \"rules.toml\"\n", ".toml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.pipeline.batch_size, 100);
    assert_eq!(config.pipeline.concurrency, 4);
    assert!(config.pipeline.keep_order);
    assert_eq!(config.pipeline.on_item_error, FailurePolicy::Abort);
    assert_eq!(config.deidentification.family, RecordFamily::Path);
    assert!(!config.audit.enabled);
    assert!(!config.logging.local_enabled);
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("TEST_DEID_RULES_DIR", "/etc/deid");

    let file = write_temp(
        "[deidentification]\nrules_path = \"${TEST_DEID_RULES_DIR}/rules.toml\"\n",
        ".toml",
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.deidentification.rules_path.to_str(), Some("/etc/deid/rules.toml"));

    cleanup_env_vars();
}

#[test]
fn test_missing_env_var_is_reported() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_temp(
        "[deidentification]\nrules_path = \"${TEST_DEID_RULES_DIR}/rules.toml\"\n",
        ".toml",
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_DEID_RULES_DIR"));
}

#[test]
fn test_env_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("DEID_APPLICATION_LOG_LEVEL", "trace");
    std::env::set_var("DEID_PIPELINE_BATCH_SIZE", "42");
    std::env::set_var("DEID_PIPELINE_ON_ITEM_ERROR", "skip");
    std::env::set_var("DEID_DEIDENTIFICATION_FAMILY", "tag");

    let file = write_temp("[deidentification]\nrules_path = \"rules.toml\"\n", ".toml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "trace");
    assert_eq!(config.pipeline.batch_size, 42);
    assert_eq!(config.pipeline.on_item_error, FailurePolicy::Skip);
    assert_eq!(config.deidentification.family, RecordFamily::Tag);

    cleanup_env_vars();
}

#[test]
fn test_invalid_override_is_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("DEID_PIPELINE_BATCH_SIZE", "lots");

    let file = write_temp("[deidentification]\nrules_path = \"rules.toml\"\n", ".toml");
    let result = load_config(file.path());
    cleanup_env_vars();

    assert!(matches!(result, Err(DeidError::Configuration(_))));
}

#[test]
fn test_out_of_range_values_fail_validation() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_temp(
        "[pipeline]\nbatch_size = 0\n[deidentification]\nrules_path = \"rules.toml\"\n",
        ".toml",
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("batch_size"));
}

#[test]
fn test_missing_config_file() {
    let err = load_config("/nonexistent/deid.toml").unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_rule_file_toml_with_env_keys() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("TEST_DEID_DATE_KEY", "from-environment");

    let file = write_temp(
        r#"
[parameters]
date_shift_key = "${TEST_DEID_DATE_KEY}"
date_shift_scope = "folder"
identifier_strategy = "mapping_table"

[[rules]]
path = "Patient.name"
method = "redact"
"#,
        ".toml",
    );
    let config = DeidConfiguration::from_file(file.path()).unwrap();
    cleanup_env_vars();

    let params = config.parameters();
    assert_eq!(params.date_shift_scope, DateShiftScope::Folder);
    assert_eq!(params.identifier_strategy, IdentifierStrategy::MappingTable);
    assert!(!params.generated_keys.contains(&"date_shift_key"));
    assert!(params.generated_keys.contains(&"crypto_hash_key"));
}

#[test]
fn test_rule_file_json() {
    let file = write_temp(
        r#"{
  "parameters": {"date_shift_range": 30},
  "rules": [
    {"path": "Patient.telecom", "method": "remove"},
    {"tag": "(0010,0010)", "method": "redact"}
  ]
}"#,
        ".json",
    );
    let config = DeidConfiguration::from_file(file.path()).unwrap();
    assert_eq!(config.rules().len(), 2);
    assert_eq!(config.parameters().date_shift_range, 30);
    assert_eq!(config.rules_for(RecordFamily::Tag).count(), 1);
}

#[test]
fn test_rule_errors_name_the_rule() {
    let err = DeidConfiguration::from_toml_str(
        r#"
[[rules]]
path = "Patient.name"
method = "redact"

[[rules]]
path = "Patient.birthDate"
method = "scramble"
"#,
    )
    .unwrap_err();

    match &err {
        ConfigError::UnsupportedMethod { index, source_text, method } => {
            assert_eq!(*index, 1);
            assert!(source_text.contains("Patient.birthDate"));
            assert_eq!(method, "scramble");
        }
        other => panic!("expected unsupported method, got {other:?}"),
    }
    assert!(err.to_string().contains("#1"));
}

#[test]
fn test_invalid_parameters_rejected() {
    let err = DeidConfiguration::from_toml_str("[parameters]\ndate_shift_range = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidParameter { .. }));

    let err = DeidConfiguration::from_toml_str("[parameters]\nencrypt_key = \"short\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidParameter { .. }));
}

#[test]
fn test_unknown_customized_setting() {
    let err = DeidConfiguration::from_toml_str(
        "[[rules]]\ntype = \"decimal\"\nmethod = \"perturb\"\nsetting = \"missing\"\n",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownSetting { index: 0, .. }));
}

#[test]
fn test_unreadable_rule_file() {
    let dir = TempDir::new().unwrap();
    let err = DeidConfiguration::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
