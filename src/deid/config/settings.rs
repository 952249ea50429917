//! Per-method settings: merging and validation
//!
//! Settings for one rule are computed as inline parameters merged over the referenced
//! customized setting, merged over the method's default setting. The merged object is
//! then deserialized into the method's typed settings and validated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Raw setting object
pub type SettingMap = Map<String, JsonValue>;

/// Merges setting layers; later layers win key by key
pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a SettingMap>) -> SettingMap {
    let mut merged = SettingMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Deserializes a merged setting object into typed settings
pub fn typed<T: for<'de> Deserialize<'de>>(merged: &SettingMap) -> Result<T, String> {
    serde_json::from_value(JsonValue::Object(merged.clone())).map_err(|e| e.to_string())
}

/// Settings for `redact`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RedactSettings {
    pub enable_partial_dates: bool,
    pub enable_partial_ages: bool,
    pub enable_partial_zip_codes: bool,
    pub restricted_zip_code_prefixes: Vec<String>,
    /// Ages above this are cleared in partial-age mode
    pub age_threshold: u32,
}

impl Default for RedactSettings {
    fn default() -> Self {
        Self {
            enable_partial_dates: false,
            enable_partial_ages: false,
            enable_partial_zip_codes: false,
            restricted_zip_code_prefixes: Vec::new(),
            age_threshold: 89,
        }
    }
}

impl RedactSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=150).contains(&self.age_threshold) {
            return Err(format!(
                "age_threshold must be between 1 and 150, got {}",
                self.age_threshold
            ));
        }
        for prefix in &self.restricted_zip_code_prefixes {
            if prefix.len() != 3 || !prefix.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!(
                    "restricted zip code prefix '{prefix}' must be exactly 3 digits"
                ));
            }
        }
        Ok(())
    }
}

/// Settings for `dateshift`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DateShiftSettings {
    /// Overrides the global date-shift range for this rule
    pub range: Option<u32>,
}

impl DateShiftSettings {
    pub fn validate(&self) -> Result<(), String> {
        match self.range {
            Some(r) if !(1..=3650).contains(&r) => {
                Err(format!("range must be between 1 and 3650 days, got {r}"))
            }
            _ => Ok(()),
        }
    }
}

/// HMAC digest used by `cryptohash`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

/// Settings for `cryptohash`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CryptoHashSettings {
    pub algorithm: HashAlgorithm,
}

/// How the perturbation span is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    /// Offset drawn from `[-span, span]`
    #[default]
    Fixed,
    /// Offset drawn from `[-span * |value|, span * |value|]`
    Proportional,
}

/// Settings for `perturb`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PerturbSettings {
    pub span: f64,
    pub range_type: RangeType,
    pub round_to: u32,
}

impl Default for PerturbSettings {
    fn default() -> Self {
        Self {
            span: 1.0,
            range_type: RangeType::Fixed,
            round_to: 2,
        }
    }
}

impl PerturbSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !self.span.is_finite() || self.span < 0.0 {
            return Err(format!("span must be a non-negative number, got {}", self.span));
        }
        if self.round_to > 28 {
            return Err(format!("round_to must be between 0 and 28, got {}", self.round_to));
        }
        Ok(())
    }
}

/// Settings for `substitute`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubstituteSettings {
    pub replace_with: JsonValue,
}

impl SubstituteSettings {
    pub fn validate(&self) -> Result<(), String> {
        match &self.replace_with {
            JsonValue::Null => Err("replace_with must not be null".to_string()),
            JsonValue::Array(_) => {
                Err("replace_with must be a scalar or an object".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Fallback when no generalize case matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtherValues {
    #[default]
    Redact,
    Keep,
}

/// One generalize case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralizeCase {
    pub when: String,
    pub then: String,
}

/// Settings for `generalize`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralizeSettings {
    pub cases: Vec<GeneralizeCase>,
    #[serde(default)]
    pub other_values: OtherValues,
}

impl GeneralizeSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.cases.is_empty() {
            return Err("cases must contain at least one entry".to_string());
        }
        Ok(())
    }
}
