//! Init command implementation
//!
//! Writes a sample application config and a sample rule file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path of the application configuration file to create
    #[arg(short, long, default_value = "deid.toml")]
    pub output: String,

    /// Path of the rule file to create
    #[arg(long, default_value = "rules.toml")]
    pub rules_output: String,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, rules = %self.rules_output, "Initializing configuration");

        println!("📝 Initializing deid configuration");
        println!();

        for path in [&self.output, &self.rules_output] {
            if Path::new(path).exists() && !self.force {
                println!("❌ File already exists: {path}");
                println!("   Use --force to overwrite");
                return Ok(2);
            }
        }

        let app_config = Self::generate_app_config(&self.rules_output);
        let writes = fs::write(&self.output, app_config)
            .and_then(|_| fs::write(&self.rules_output, Self::generate_rules()));

        match writes {
            Ok(()) => {
                println!("✅ Configuration file created: {}", self.output);
                println!("✅ Rule file created: {}", self.rules_output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} to match your records", self.rules_output);
                println!("  2. Set DEID_DATE_SHIFT_KEY, DEID_CRYPTO_HASH_KEY and DEID_ENCRYPT_KEY");
                println!("     (e.g. in a .env file) and uncomment the keys in the rule file");
                println!("  3. Validate configuration: deid validate-config");
                println!("  4. Run: deid run --input records.ndjson --output deidentified.ndjson");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration files");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }

    /// Application configuration pointing at `rules_path`
    fn generate_app_config(rules_path: &str) -> String {
        format!(
            r#"# deid application configuration

[application]
log_level = "info"            # trace | debug | info | warn | error

[pipeline]
batch_size = 100              # 1-10000
concurrency = 4               # 1-256
keep_order = true
on_item_error = "abort"       # abort | skip

[deidentification]
rules_path = "{rules_path}"
family = "path"               # path | tag

[audit]
enabled = false
log_path = "./audit/deid.log"
json_format = true

[logging]
local_enabled = false
local_path = "./logs"
local_rotation = "daily"      # daily | hourly
"#
        )
    }

    /// Sample rules for both record families
    fn generate_rules() -> String {
        r#"# deid rule configuration
#
# Rules are evaluated in order; the first rule that selects a node wins.
# Keys left unset are generated at load time and differ on every run.

[parameters]
# date_shift_key = "${DEID_DATE_SHIFT_KEY}"
# crypto_hash_key = "${DEID_CRYPTO_HASH_KEY}"
# encrypt_key = "${DEID_ENCRYPT_KEY}"
date_shift_scope = "resource"       # resource | file | folder
date_shift_range = 50
on_error = "raise"                  # raise | skip
pseudonymize_identifiers = true
identifier_strategy = "keyed_hash"  # keyed_hash | mapping_table
validate_output = false

[default_settings.redact]
enable_partial_dates = true
enable_partial_ages = true
enable_partial_zip_codes = true
restricted_zip_code_prefixes = ["036", "059", "102", "203", "205"]
age_threshold = 89

[customized_settings.coarse]
span = 0.1
range_type = "proportional"

# Path family (FHIR-style resources)

[[rules]]
path = "Patient.name"
method = "redact"

[[rules]]
path = "Patient.telecom"
method = "remove"

[[rules]]
path = "Patient.address"
method = "redact"

[[rules]]
path = "Patient.identifier.value"
method = "cryptoHash"

[[rules]]
type = "date"
method = "dateShift"

[[rules]]
type = "dateTime"
method = "dateShift"

[[rules]]
type = "decimal"
method = "perturb"
setting = "coarse"

# Tag family (DICOM datasets)

[[rules]]
tag = "(0010,0010)"
method = "redact"

[[rules]]
tag = "(0010,0020)"
method = "cryptoHash"

[[rules]]
vr = "DA"
method = "dateShift"

[[rules]]
vr = "UI"
method = "refreshUID"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DeidConfig;
    use crate::deid::config::DeidConfiguration;
    use tempfile::TempDir;

    #[test]
    fn test_generated_app_config_parses() {
        let text = InitArgs::generate_app_config("my-rules.toml");
        let config: DeidConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.deidentification.rules_path.to_str(), Some("my-rules.toml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_rules_load() {
        let config = DeidConfiguration::from_toml_str(&InitArgs::generate_rules()).unwrap();
        assert_eq!(config.rules().len(), 11);
        assert_eq!(config.parameters().generated_keys.len(), 3);
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("deid.toml");
        std::fs::write(&output, "existing").unwrap();

        let args = InitArgs {
            output: output.to_str().unwrap().to_string(),
            rules_output: dir.path().join("rules.toml").to_str().unwrap().to_string(),
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "existing");
    }

    #[tokio::test]
    async fn test_init_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            output: dir.path().join("deid.toml").to_str().unwrap().to_string(),
            rules_output: dir.path().join("rules.toml").to_str().unwrap().to_string(),
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 0);
        assert!(dir.path().join("rules.toml").exists());
    }
}
