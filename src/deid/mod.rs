//! Rule-driven de-identification engine
//!
//! # Overview
//!
//! - [`config`]: rule configuration parsing, setting resolution and validation
//! - [`rules`], [`selector`], [`expression`]: compiled rules and their selectors
//! - [`matcher`]: per-resource node indexes and selector resolution
//! - [`tags`]: tag dictionary and load-time tag rule lookup
//! - [`processors`]: one algorithm per method
//! - [`visitor`]: per-resource traversal with visited sets and result folding
//! - [`identifiers`]: identifier and reference pseudonymization
//! - [`engine`]: the entry point tying these together
//!
//! The engine is single-threaded per record. Concurrency lives in
//! [`crate::core::pipeline`].

pub mod audit;
pub mod config;
pub mod crypto;
pub mod datetime;
pub mod engine;
pub mod expression;
pub mod identifiers;
pub mod matcher;
pub mod processors;
pub mod result;
pub mod rules;
pub mod selector;
pub mod tags;
pub mod validation;
pub mod visitor;

pub use config::DeidConfiguration;
pub use engine::{DeidEngine, DeidOutcome};
pub use result::ProcessResult;
