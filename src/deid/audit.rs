//! Audit log of de-identified records
//!
//! One entry per record. The record identifier is stored as a SHA-256 digest so the
//! audit trail never contains a plaintext identifier.

use crate::deid::engine::DeidOutcome;
use crate::domain::{DeidError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Audit log entry
#[derive(Debug, Serialize)]
struct AuditLogEntry {
    timestamp: String,
    record_id_hash: String,
    family: String,
    effects: Vec<&'static str>,
    rules_applied: usize,
    skipped_resources: usize,
    processing_time_ms: u64,
}

/// Appends audit entries to a log file
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
    json_format: bool,
    enabled: bool,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(log_path: PathBuf, json_format: bool, enabled: bool) -> Result<Self> {
        if enabled {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DeidError::Io(format!(
                        "Failed to create audit log directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        Ok(Self {
            log_path,
            json_format,
            enabled,
            write_lock: Mutex::new(()),
        })
    }

    /// A logger that records nothing
    pub fn disabled() -> Self {
        Self {
            log_path: PathBuf::new(),
            json_format: true,
            enabled: false,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records the outcome of one engine run
    pub fn log_outcome(&self, record_id: &str, outcome: &DeidOutcome, processing_time_ms: u64) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            record_id_hash: hash_identifier(record_id),
            family: outcome.family.to_string(),
            effects: outcome.result.labels().iter().map(|l| l.code()).collect(),
            rules_applied: outcome.rules_applied,
            skipped_resources: outcome.skipped_resources,
            processing_time_ms,
        };
        self.write_entry(&entry)
    }

    fn write_entry(&self, entry: &AuditLogEntry) -> Result<()> {
        let line = if self.json_format {
            serde_json::to_string(entry)?
        } else {
            format!(
                "[{}] Record: {} | Family: {} | Effects: {} | Rules: {} | Skipped: {} | Time: {}ms",
                entry.timestamp,
                entry.record_id_hash,
                entry.family,
                entry.effects.join(","),
                entry.rules_applied,
                entry.skipped_resources,
                entry.processing_time_ms
            )
        };

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DeidError::Io("Audit log lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                DeidError::Io(format!("Failed to open audit log {}: {e}", self.log_path.display()))
            })?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// SHA-256 hex digest of a record identifier
fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}
