//! CLI interface and argument parsing
//!
//! Exit codes: 0 success, 2 configuration error, 3 cancelled, 5 fatal error.

pub mod commands;

use clap::{Parser, Subcommand};

/// Deid - rule-driven de-identification of clinical records
#[derive(Parser, Debug)]
#[command(name = "deid")]
#[command(version, about, long_about = None)]
#[command(author = "Deid Contributors")]
pub struct Cli {
    /// Path to the application configuration file
    #[arg(short, long, default_value = "deid.toml", env = "DEID_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DEID_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// De-identify an NDJSON file
    Run(commands::run::RunArgs),

    /// Validate the application and rule configuration
    ValidateConfig(commands::validate::ValidateArgs),

    /// Write a sample application config and rule file
    Init(commands::init::InitArgs),
}
