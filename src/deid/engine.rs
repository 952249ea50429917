//! De-identification engine
//!
//! [`DeidEngine`] binds a loaded [`DeidConfiguration`] to the identifier transformer
//! and an optional audit logger. It is immutable after construction and can be shared
//! across worker tasks behind an `Arc`; each call works on its own tree, visited sets
//! and result aggregates.
//!
//! # Examples
//!
//! ```rust
//! use deid::deid::{config::DeidConfiguration, engine::DeidEngine};
//! use deid::domain::RecordFamily;
//! use serde_json::json;
//!
//! let config = DeidConfiguration::from_toml_str(r#"
//! [[rules]]
//! path = "Patient.name"
//! method = "redact"
//! "#).unwrap();
//! let engine = DeidEngine::new(config).unwrap();
//!
//! let (output, outcome) = engine
//!     .deidentify_json(json!({
//!         "resourceType": "Patient",
//!         "id": "example",
//!         "name": [{"family": "Chalmers"}]
//!     }), RecordFamily::Path)
//!     .unwrap();
//!
//! assert!(output.get("name").is_none());
//! assert!(outcome.result.redacted);
//! ```

use crate::adapters;
use crate::deid::audit::AuditLogger;
use crate::deid::config::{DeidConfiguration, ErrorPolicy};
use crate::deid::identifiers::IdentifierTransformer;
use crate::deid::result::ProcessResult;
use crate::deid::validation;
use crate::deid::visitor::{make_placeholder, Visitor};
use crate::domain::{RecordFamily, RecordTree, Result, Tag};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

/// Effects of one engine run on one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeidOutcome {
    pub family: RecordFamily,
    /// Aggregate effect flags of the root resource
    pub result: ProcessResult,
    /// Resources replaced by an empty placeholder under the `skip` policy
    pub skipped_resources: usize,
    pub rules_applied: usize,
}

/// Rule-driven de-identification engine
#[derive(Debug)]
pub struct DeidEngine {
    config: DeidConfiguration,
    identifiers: IdentifierTransformer,
    audit: AuditLogger,
}

impl DeidEngine {
    /// Creates an engine, loading the identifier mapping table if one is configured
    pub fn new(config: DeidConfiguration) -> Result<Self> {
        let identifiers = IdentifierTransformer::new(config.parameters())?;
        tracing::debug!(
            rules = config.rules().len(),
            strategy = ?config.parameters().identifier_strategy,
            "De-identification engine ready"
        );
        Ok(Self {
            config,
            identifiers,
            audit: AuditLogger::disabled(),
        })
    }

    /// Loads a rule file and creates an engine from it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(DeidConfiguration::from_file(path)?)
    }

    /// Attaches an audit logger (builder style)
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &DeidConfiguration {
        &self.config
    }

    /// De-identifies a record tree in place
    ///
    /// Rules are applied per resource frame, emptied nodes are pruned, and the record
    /// is optionally validated. Processing errors follow the configured `on_error`
    /// policy: `raise` returns them, `skip` leaves an empty placeholder resource.
    pub fn deidentify(&self, tree: &mut RecordTree) -> Result<DeidOutcome> {
        let started = Instant::now();
        let record_id = record_id(tree);

        let visit = Visitor::new(&self.config, &self.identifiers).visit(tree.family, &mut tree.root)?;
        tree.prune();

        let mut outcome = DeidOutcome {
            family: tree.family,
            result: visit.result,
            skipped_resources: visit.skipped_resources,
            rules_applied: visit.rules_applied,
        };

        if self.config.parameters().validate_output {
            if let Err(err) = validation::validate(&tree.root, tree.family) {
                if self.config.parameters().on_error == ErrorPolicy::Raise {
                    return Err(err.into());
                }
                tracing::warn!(error = %err, "Record replaced by an empty placeholder");
                make_placeholder(&mut tree.root);
                outcome.skipped_resources += 1;
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        self.audit.log_outcome(&record_id, &outcome, elapsed)?;
        tracing::trace!(
            rules_applied = outcome.rules_applied,
            skipped = outcome.skipped_resources,
            duration_ms = elapsed,
            "Record de-identified"
        );
        Ok(outcome)
    }

    /// Parses a JSON record, de-identifies it and serializes it back
    pub fn deidentify_json(&self, value: Value, family: RecordFamily) -> Result<(Value, DeidOutcome)> {
        let mut tree = adapters::tree_from_json(&value, family)?;
        let outcome = self.deidentify(&mut tree)?;
        Ok((adapters::tree_to_json(&tree), outcome))
    }

    /// Persists the identifier mapping table, when that strategy is configured
    pub fn save_identifier_mapping(&self) -> Result<()> {
        let params = self.config.parameters();
        if let (Some(table), Some(path)) = (
            self.identifiers.mapping_table(),
            params.identifier_mapping_path.as_deref(),
        ) {
            table.save(path)?;
            tracing::info!(entries = table.len(), path = %path.display(), "Identifier mapping saved");
        }
        Ok(())
    }
}

/// Identifier of a record for audit purposes
fn record_id(tree: &RecordTree) -> String {
    let id = match tree.family {
        RecordFamily::Path => tree.root.child_value("id"),
        RecordFamily::Tag => tree.root.child_value(&Tag::new(0x0010, 0x0020).to_string()),
    };
    id.unwrap_or_default().to_string()
}
