//! Raw rule-configuration documents as written on disk

use super::parameters::RawParameters;
use super::settings::SettingMap;
use crate::domain::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Text format of a rule configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format implied by a file extension; TOML unless the extension is `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// The whole rule-configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDeidConfig {
    #[serde(default)]
    pub parameters: RawParameters,
    /// Default settings per method name
    #[serde(default)]
    pub default_settings: BTreeMap<String, SettingMap>,
    /// Named settings rules can reference with `setting = "<name>"`
    #[serde(default)]
    pub customized_settings: BTreeMap<String, SettingMap>,
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

impl RawDeidConfig {
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Toml => toml::from_str(text)
                .map_err(|e| ConfigError::Parse(format!("TOML parse error: {e}"))),
            ConfigFormat::Json => serde_json::from_str(text)
                .map_err(|e| ConfigError::Parse(format!("JSON parse error: {e}"))),
        }
    }
}

/// One rule entry; every key besides the known ones is an inline parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(flatten)]
    pub params: SettingMap,
}

impl RawRule {
    /// Selector text as written, for error messages
    pub fn source_text(&self) -> String {
        let selectors: Vec<String> = [
            self.path.as_ref().map(|p| format!("path = {p}")),
            self.type_name.as_ref().map(|t| format!("type = {t}")),
            self.tag.as_ref().map(|t| format!("tag = {t}")),
            self.vr.as_ref().map(|v| format!("vr = {v}")),
        ]
        .into_iter()
        .flatten()
        .collect();
        selectors.join(", ")
    }
}
