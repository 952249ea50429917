//! Global de-identification parameters: keys, date-shift scope and policies

use crate::config::secret::{key_or_generate, SecretString};
use crate::domain::ConfigError;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default date-shift range, in days
pub const DEFAULT_DATE_SHIFT_RANGE: u32 = 50;

/// Unit that shares one date-shift offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateShiftScope {
    /// Offset derived from each resource's own identifier
    #[default]
    Resource,
    /// Offset derived from the scope prefix (the file name)
    File,
    /// Offset derived from the scope prefix (the folder name)
    Folder,
}

/// What happens to a record when a processing error occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Return the error to the caller
    #[default]
    Raise,
    /// Replace the failing resource with an empty placeholder and continue
    Skip,
}

/// How resource identifiers are pseudonymized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierStrategy {
    /// Deterministic keyed hash of the original identifier
    #[default]
    KeyedHash,
    /// Random identifiers recorded in a persisted mapping table
    MappingTable,
}

/// Parameter block as written in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawParameters {
    pub date_shift_key: Option<String>,
    #[serde(default)]
    pub date_shift_key_prefix: String,
    #[serde(default)]
    pub date_shift_scope: DateShiftScope,
    pub date_shift_range: Option<u32>,
    pub crypto_hash_key: Option<String>,
    pub encrypt_key: Option<String>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    pub pseudonymize_identifiers: Option<bool>,
    #[serde(default)]
    pub identifier_strategy: IdentifierStrategy,
    pub identifier_mapping_path: Option<PathBuf>,
    #[serde(default)]
    pub validate_output: bool,
}

/// Resolved parameters with every key present
#[derive(Debug, Clone)]
pub struct DeidParameters {
    pub date_shift_key: SecretString,
    pub date_shift_key_prefix: String,
    pub date_shift_scope: DateShiftScope,
    pub date_shift_range: u32,
    pub crypto_hash_key: SecretString,
    pub encrypt_key: SecretString,
    pub on_error: ErrorPolicy,
    pub pseudonymize_identifiers: bool,
    pub identifier_strategy: IdentifierStrategy,
    pub identifier_mapping_path: Option<PathBuf>,
    pub validate_output: bool,
    /// Names of the keys that were generated at load time
    pub generated_keys: Vec<&'static str>,
}

fn invalid(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name: name.to_string(),
        message: message.into(),
    }
}

impl RawParameters {
    /// Validates the block and fills absent keys with generated values
    pub fn resolve(self) -> Result<DeidParameters, ConfigError> {
        let date_shift_range = self.date_shift_range.unwrap_or(DEFAULT_DATE_SHIFT_RANGE);
        if !(1..=3650).contains(&date_shift_range) {
            return Err(invalid(
                "date_shift_range",
                format!("must be between 1 and 3650 days, got {date_shift_range}"),
            ));
        }

        if let Some(key) = &self.encrypt_key {
            if !key.is_empty() && ![16, 24, 32].contains(&key.len()) {
                return Err(invalid(
                    "encrypt_key",
                    format!("must be 16, 24 or 32 bytes long, got {}", key.len()),
                ));
            }
        }

        if self.identifier_strategy == IdentifierStrategy::KeyedHash
            && self.identifier_mapping_path.is_some()
        {
            return Err(invalid(
                "identifier_mapping_path",
                "only valid with identifier_strategy = \"mapping_table\"",
            ));
        }

        let mut generated_keys = Vec::new();
        let (date_shift_key, generated) = key_or_generate(self.date_shift_key);
        if generated {
            generated_keys.push("date_shift_key");
        }
        let (crypto_hash_key, generated) = key_or_generate(self.crypto_hash_key);
        if generated {
            generated_keys.push("crypto_hash_key");
        }
        let (encrypt_key, generated) = key_or_generate(self.encrypt_key);
        if generated {
            generated_keys.push("encrypt_key");
        }

        Ok(DeidParameters {
            date_shift_key,
            date_shift_key_prefix: self.date_shift_key_prefix,
            date_shift_scope: self.date_shift_scope,
            date_shift_range,
            crypto_hash_key,
            encrypt_key,
            on_error: self.on_error,
            pseudonymize_identifiers: self.pseudonymize_identifiers.unwrap_or(true),
            identifier_strategy: self.identifier_strategy,
            identifier_mapping_path: self.identifier_mapping_path,
            validate_output: self.validate_output,
            generated_keys,
        })
    }
}

impl DeidParameters {
    /// Date-shift scope key for a resource
    ///
    /// Resource scope combines the prefix with the resource identifier; file and
    /// folder scope use the prefix alone so every resource in the unit shifts alike.
    pub fn date_shift_scope_key(&self, resource_id: &str) -> String {
        match self.date_shift_scope {
            DateShiftScope::Resource => format!("{}{}", self.date_shift_key_prefix, resource_id),
            DateShiftScope::File | DateShiftScope::Folder => self.date_shift_key_prefix.clone(),
        }
    }

    /// Length in bytes of the encryption key
    pub fn encrypt_key_len(&self) -> usize {
        self.encrypt_key.expose_secret().len()
    }
}
