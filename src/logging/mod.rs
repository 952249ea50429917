//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output filtered by level or `RUST_LOG`
//! - JSON-formatted local log files with daily or hourly rotation
//!
//! Record values are never logged; only locations, rule indices and counts.
//!
//! # Example
//!
//! ```no_run
//! use deid::logging::init_logging;
//! use deid::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log one rule application
///
/// # Example
///
/// ```no_run
/// use deid::log_rule_applied;
///
/// log_rule_applied!(0, "redact", "Patient.name[0]");
/// ```
#[macro_export]
macro_rules! log_rule_applied {
    ($rule:expr, $method:expr, $location:expr) => {
        tracing::trace!(
            rule = $rule,
            method = %$method,
            location = %$location,
            "Rule applied"
        );
    };
}

/// Log a batch handed to the consumer
///
/// # Example
///
/// ```no_run
/// use deid::log_batch_committed;
///
/// log_batch_committed!(3, 100, 400);
/// ```
#[macro_export]
macro_rules! log_batch_committed {
    ($sequence:expr, $batch_size:expr, $consumed:expr) => {
        tracing::debug!(
            sequence = $sequence,
            batch_size = $batch_size,
            consumed = $consumed,
            "Batch committed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use deid::log_error_with_context;
/// use deid::domain::PipelineError;
///
/// let error = PipelineError::Reader("unexpected end of input".to_string());
/// log_error_with_context!(&error, "Failed to read input");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
