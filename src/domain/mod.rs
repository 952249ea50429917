//! Domain models and types for deid.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Record tree** ([`Node`], [`RecordTree`], [`RecordFamily`])
//! - **Strongly-typed identifiers** ([`Tag`], [`ResourceType`])
//! - **Error types** ([`DeidError`], [`ConfigError`], [`ProcessingError`], [`PipelineError`])
//! - **Result type alias** ([`Result`])
//!
//! # Building a tree
//!
//! ```rust
//! use deid::domain::{Node, RecordFamily, RecordTree};
//!
//! let patient = Node::resource("Patient", "Patient")
//!     .with_child(Node::leaf("id", "id", "example"))
//!     .with_child(Node::leaf("birthDate", "date", "1974-12-25"));
//! let tree = RecordTree::new(RecordFamily::Path, patient);
//!
//! assert_eq!(tree.root.child("birthDate").unwrap().location, "Patient.birthDate[0]");
//! ```

pub mod errors;
pub mod ids;
pub mod node;
pub mod result;

pub use errors::{ConfigError, DeidError, PipelineError, ProcessingError};
pub use ids::{ResourceType, Tag};
pub use node::{child_location, Node, NodeKind, NodePath, RecordFamily, RecordTree};
pub use result::Result;
