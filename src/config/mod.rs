//! Application configuration for deid.
//!
//! # Overview
//!
//! deid uses a TOML application config with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `DEID_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! The de-identification rules are a separate file, referenced from
//! `[deidentification] rules_path` and loaded by [`crate::deid::config`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use deid::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("deid.toml")?;
//!
//! println!("Rules: {}", config.deidentification.rules_path.display());
//! println!("Batch size: {}", config.pipeline.batch_size);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [pipeline]
//! batch_size = 100
//! concurrency = 4
//! keep_order = true
//! on_item_error = "abort"
//!
//! [deidentification]
//! rules_path = "rules.toml"
//! family = "path"
//!
//! [audit]
//! enabled = false
//! log_path = "./audit/deid.log"
//!
//! [logging]
//! local_enabled = false
//! local_path = "./logs"
//! local_rotation = "daily"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{
    ApplicationConfig, AuditConfig, DeidConfig, DeidentificationConfig, LoggingConfig,
    PipelineConfig,
};
pub use secret::{generate_key, key_or_generate, secret_string, SecretString, SecretValue};
