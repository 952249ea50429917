//! Validate config command implementation
//!
//! Loads the application config and the rule file it references, then prints a
//! summary. Key values are never printed; only whether they were generated.

use crate::config::load_config;
use crate::deid::config::DeidConfiguration;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let rules_path = &config.deidentification.rules_path;
        let rules = match DeidConfiguration::from_file(rules_path) {
            Ok(r) => {
                println!("✅ Rule file loaded successfully: {}", rules_path.display());
                r
            }
            Err(e) => {
                println!("❌ Failed to load rule file {}", rules_path.display());
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let params = rules.parameters();
        let family = config.deidentification.family;

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Record Family: {family}");
        println!("  Batch Size: {}", config.pipeline.batch_size);
        println!("  Concurrency: {}", config.pipeline.concurrency);
        println!("  Keep Order: {}", config.pipeline.keep_order);
        println!("  On Item Error: {:?}", config.pipeline.on_item_error);
        println!("  Audit Log: {}", if config.audit.enabled { "enabled" } else { "disabled" });
        println!();
        println!("Rule Summary:");
        println!("  Rules: {} ({} for this family)", rules.rules().len(), rules.rules_for(family).count());
        println!("  Date Shift Scope: {:?}", params.date_shift_scope);
        println!("  Date Shift Range: {} days", params.date_shift_range);
        println!("  On Error: {:?}", params.on_error);
        println!("  Pseudonymize Identifiers: {}", params.pseudonymize_identifiers);
        println!("  Identifier Strategy: {:?}", params.identifier_strategy);
        println!("  Validate Output: {}", params.validate_output);
        if !params.generated_keys.is_empty() {
            println!(
                "  ⚠️  Generated keys (not reproducible across runs): {}",
                params.generated_keys.join(", ")
            );
        }
        println!();
        Ok(0)
    }
}
