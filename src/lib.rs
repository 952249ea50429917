// Deid - Rule-driven de-identification of clinical records
// Copyright (c) 2025 Deid Contributors
// Licensed under the MIT License

//! # Deid - rule-driven de-identification
//!
//! Deid removes or transforms identifying information in structured clinical records
//! according to a declarative rule configuration, producing de-identified records
//! that keep their structure and stay internally consistent.
//!
//! ## Overview
//!
//! This library provides:
//! - **Rule configuration** loaded from TOML or JSON, validated up front
//! - **Two record families**: path-addressed resources (FHIR-style JSON) and
//!   tag-addressed datasets (DICOM JSON)
//! - **Transformation methods**: redact, date shift, keyed hash, encrypt, perturb,
//!   substitute, generalize, keep, remove and UID regeneration
//! - **Identifier pseudonymization** that keeps references consistent
//! - **A partitioned batch executor** with bounded memory and cooperative cancellation
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`deid`] - The de-identification engine (rules, matcher, visitor, processors)
//! - [`core`] - Batch orchestration
//! - [`adapters`] - Record formats and NDJSON I/O
//! - [`domain`] - Record tree, identifiers and errors
//! - [`config`] - Application configuration and key material
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust
//! use deid::deid::{DeidConfiguration, DeidEngine};
//! use deid::domain::RecordFamily;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeidConfiguration::from_toml_str(r#"
//! [parameters]
//! date_shift_key = "site-key"
//!
//! [[rules]]
//! path = "Patient.telecom"
//! method = "remove"
//!
//! [[rules]]
//! type = "date"
//! method = "dateShift"
//! "#)?;
//! let engine = DeidEngine::new(config)?;
//!
//! let (record, outcome) = engine.deidentify_json(
//!     json!({
//!         "resourceType": "Patient",
//!         "id": "example",
//!         "telecom": [{"system": "phone", "value": "555-0100"}],
//!         "birthDate": "1974-12-25"
//!     }),
//!     RecordFamily::Path,
//! )?;
//!
//! assert!(record.get("telecom").is_none());
//! assert!(outcome.result.redacted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library functions return [`domain::Result`], backed by [`domain::DeidError`].
//! Configuration errors name the offending rule; processing errors follow the
//! configured `on_error` policy.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod deid;
pub mod domain;
pub mod logging;
