//! Integration tests for logging and the audit trail

use deid::config::LoggingConfig;
use deid::deid::audit::AuditLogger;
use deid::deid::{DeidConfiguration, DeidEngine};
use deid::domain::RecordFamily;
use deid::logging::init_logging;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(!config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.local_path, "./logs");
}

// The global subscriber can only be installed once per test binary
#[test]
fn test_file_logging_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "hourly".to_string(),
    };
    assert!(!log_path.exists());

    let guard = init_logging("debug", &config).unwrap();
    tracing::info!("written to the rotating file");
    drop(guard);

    assert!(log_path.is_dir());
    let files: Vec<_> = std::fs::read_dir(&log_path).unwrap().collect();
    assert!(!files.is_empty());
}

fn audited_engine(log_path: std::path::PathBuf, json_format: bool) -> DeidEngine {
    let config = DeidConfiguration::from_toml_str(
        "[parameters]\npseudonymize_identifiers = false\n[[rules]]\npath = \"Patient.name\"\nmethod = \"redact\"\n",
    )
    .unwrap();
    let audit = AuditLogger::new(log_path, json_format, true).unwrap();
    DeidEngine::new(config).unwrap().with_audit(audit)
}

fn patient(id: &str) -> Value {
    json!({"resourceType": "Patient", "id": id, "name": [{"family": "Chalmers"}]})
}

#[test]
fn test_audit_log_hashes_record_ids() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("audit/deid.log");
    let engine = audited_engine(log_path.clone(), true);

    engine.deidentify_json(patient("pat-001"), RecordFamily::Path).unwrap();
    engine.deidentify_json(patient("pat-002"), RecordFamily::Path).unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(!contents.contains("pat-001"));

    let entries: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 2);

    let expected = format!("{:x}", Sha256::digest(b"pat-001"));
    assert_eq!(entries[0]["record_id_hash"], expected);
    assert_eq!(entries[0]["family"], "path");
    assert_eq!(entries[0]["effects"], json!(["REDACTED"]));
    assert_eq!(entries[0]["rules_applied"], 1);
}

#[test]
fn test_audit_log_plain_text() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("deid.log");
    let engine = audited_engine(log_path.clone(), false);

    engine.deidentify_json(patient("pat-003"), RecordFamily::Path).unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("Effects: REDACTED"));
    assert!(contents.contains("Family: path"));
}

#[test]
fn test_disabled_audit_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("deid.log");
    let audit = AuditLogger::new(log_path.clone(), true, false).unwrap();
    assert!(!audit.is_enabled());

    let config = DeidConfiguration::from_toml_str("").unwrap();
    let engine = DeidEngine::new(config).unwrap().with_audit(audit);
    engine.deidentify_json(patient("pat-004"), RecordFamily::Path).unwrap();

    assert!(!log_path.exists());
}
