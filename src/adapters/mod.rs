//! Record formats and batch I/O.
//!
//! Adapters keep external representations out of the engine:
//!
//! - [`fhir_json`] - FHIR-style JSON resources (path family)
//! - [`dicom_json`] - DICOM JSON datasets (tag family)
//! - [`ndjson`] - newline-delimited JSON reader/writer for the batch executor
//!
//! # Example
//!
//! ```rust
//! use deid::adapters::{tree_from_json, tree_to_json};
//! use deid::domain::RecordFamily;
//! use serde_json::json;
//!
//! let input = json!({"resourceType": "Patient", "id": "p1", "birthDate": "1974-12-25"});
//! let tree = tree_from_json(&input, RecordFamily::Path).unwrap();
//! assert_eq!(tree.root.child("birthDate").unwrap().instance_type, "date");
//! assert_eq!(tree_to_json(&tree), input);
//! ```

pub mod dicom_json;
pub mod fhir_json;
pub mod ndjson;

use crate::domain::{RecordFamily, RecordTree, Result};
use serde_json::Value;

/// Parses a JSON record of the given family
pub fn tree_from_json(value: &Value, family: RecordFamily) -> Result<RecordTree> {
    match family {
        RecordFamily::Path => fhir_json::tree_from_json(value),
        RecordFamily::Tag => dicom_json::tree_from_json(value),
    }
}

/// Serializes a record tree back to the JSON shape of its family
pub fn tree_to_json(tree: &RecordTree) -> Value {
    match tree.family {
        RecordFamily::Path => fhir_json::tree_to_json(tree),
        RecordFamily::Tag => dicom_json::tree_to_json(tree),
    }
}
