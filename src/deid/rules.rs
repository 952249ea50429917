//! Compiled rules
//!
//! A raw rule becomes a [`Rule`]: its selector is compiled (path, type, tag or VR),
//! its method is resolved to a [`RuleProcessor`], and its settings are merged as
//! inline parameters over the referenced customized setting over the method default.

use crate::deid::config::file::{RawDeidConfig, RawRule};
use crate::deid::config::settings::{merge_layers, SettingMap};
use crate::deid::processors::{normalize_method, BuildError, ProcessorRegistry, RuleProcessor};
use crate::deid::selector::Selector;
use crate::deid::tags::{TagPattern, TagRuleSet};
use crate::domain::{ConfigError, RecordFamily};
use std::collections::BTreeMap;

/// What a rule targets
#[derive(Debug, Clone)]
pub enum RuleSelector {
    Path(Selector),
    /// Every node of a semantic type, expanded to a `nodesByType` selector
    Type { type_name: String, selector: Selector },
    Tag(TagPattern),
    Vr(String),
}

impl RuleSelector {
    pub fn family(&self) -> RecordFamily {
        match self {
            RuleSelector::Path(_) | RuleSelector::Type { .. } => RecordFamily::Path,
            RuleSelector::Tag(_) | RuleSelector::Vr(_) => RecordFamily::Tag,
        }
    }

    /// The compiled selector of a path-family rule
    pub fn path_selector(&self) -> Option<&Selector> {
        match self {
            RuleSelector::Path(selector) | RuleSelector::Type { selector, .. } => Some(selector),
            _ => None,
        }
    }

    pub fn is_type_rule(&self) -> bool {
        matches!(self, RuleSelector::Type { .. })
    }
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Position in declaration order
    pub index: usize,
    /// Selector text as written
    pub source: String,
    pub selector: RuleSelector,
    pub processor: RuleProcessor,
}

impl Rule {
    pub fn method(&self) -> &str {
        self.processor.name()
    }

    pub fn family(&self) -> RecordFamily {
        self.selector.family()
    }
}

/// Compiles every rule of a document and builds the tag lookup table
pub fn compile_rules(
    raw: &RawDeidConfig,
    registry: &ProcessorRegistry,
) -> Result<(Vec<Rule>, TagRuleSet), ConfigError> {
    let defaults: BTreeMap<String, &SettingMap> = raw
        .default_settings
        .iter()
        .map(|(method, settings)| (normalize_method(method), settings))
        .collect();

    let mut rules = Vec::with_capacity(raw.rules.len());
    let mut tag_rules = TagRuleSet::new();
    for (index, raw_rule) in raw.rules.iter().enumerate() {
        let rule = compile_rule(index, raw_rule, &defaults, &raw.customized_settings, registry)?;
        match &rule.selector {
            RuleSelector::Tag(pattern) => tag_rules.insert_pattern(*pattern, index),
            RuleSelector::Vr(vr) => tag_rules.insert_vr(vr, index),
            _ => {}
        }
        rules.push(rule);
    }
    Ok((rules, tag_rules))
}

fn compile_rule(
    index: usize,
    raw: &RawRule,
    defaults: &BTreeMap<String, &SettingMap>,
    customized: &BTreeMap<String, SettingMap>,
    registry: &ProcessorRegistry,
) -> Result<Rule, ConfigError> {
    let source = raw.source_text();
    let selector = compile_selector(index, raw, &source)?;

    let method = raw.method.as_deref().filter(|m| !m.trim().is_empty()).ok_or_else(|| {
        ConfigError::UnsupportedMethod {
            index,
            source_text: source.clone(),
            method: String::new(),
        }
    })?;

    let empty = SettingMap::new();
    let default = defaults.get(&normalize_method(method)).copied().unwrap_or(&empty);
    let named = match &raw.setting {
        Some(name) => customized.get(name).ok_or_else(|| ConfigError::UnknownSetting {
            index,
            source_text: source.clone(),
            setting: name.clone(),
        })?,
        None => &empty,
    };
    let merged = merge_layers([default, named, &raw.params]);

    let processor = RuleProcessor::build(method, &merged, selector.family(), registry).map_err(
        |err| match err {
            BuildError::Unsupported => ConfigError::UnsupportedMethod {
                index,
                source_text: source.clone(),
                method: method.to_string(),
            },
            BuildError::Setting(message) => ConfigError::InvalidSetting {
                index,
                source_text: source.clone(),
                message,
            },
            BuildError::Expression(message) => ConfigError::InvalidExpression {
                index,
                source_text: source.clone(),
                message,
            },
        },
    )?;

    Ok(Rule {
        index,
        source,
        selector,
        processor,
    })
}

fn compile_selector(index: usize, raw: &RawRule, source: &str) -> Result<RuleSelector, ConfigError> {
    let declared = [&raw.path, &raw.type_name, &raw.tag, &raw.vr]
        .iter()
        .filter(|s| s.is_some())
        .count();
    if declared == 0 {
        return Err(ConfigError::MissingSelector { index });
    }
    if declared > 1 {
        return Err(ConfigError::AmbiguousSelector {
            index,
            source_text: source.to_string(),
        });
    }

    let invalid_expression = |message: String| ConfigError::InvalidExpression {
        index,
        source_text: source.to_string(),
        message,
    };

    if let Some(path) = &raw.path {
        return Selector::compile(path)
            .map(RuleSelector::Path)
            .map_err(|e| invalid_expression(e.to_string()));
    }
    if let Some(type_name) = &raw.type_name {
        return Selector::for_type(type_name)
            .map(|selector| RuleSelector::Type {
                type_name: type_name.clone(),
                selector,
            })
            .map_err(|e| invalid_expression(e.to_string()));
    }
    if let Some(tag) = &raw.tag {
        return TagPattern::parse(tag)
            .map(RuleSelector::Tag)
            .map_err(|_| ConfigError::UnknownTag {
                index,
                tag: tag.clone(),
            });
    }
    match &raw.vr {
        Some(vr) if vr.len() == 2 && vr.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(RuleSelector::Vr(vr.to_uppercase()))
        }
        Some(vr) => Err(invalid_expression(format!("'{vr}' is not a value representation"))),
        None => Err(ConfigError::MissingSelector { index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deid::config::file::ConfigFormat;

    fn compile(text: &str) -> Result<Vec<Rule>, ConfigError> {
        let raw = RawDeidConfig::parse(text, ConfigFormat::Toml)?;
        compile_rules(&raw, &ProcessorRegistry::new()).map(|(rules, _)| rules)
    }

    #[test]
    fn test_compiles_each_selector_kind() {
        let rules = compile(
            r#"
[[rules]]
path = "Patient.name"
method = "redact"

[[rules]]
type = "Address"
method = "keep"

[[rules]]
tag = "PatientBirthDate"
method = "dateShift"

[[rules]]
vr = "pn"
method = "cryptoHash"
"#,
        )
        .unwrap();

        assert_eq!(rules.len(), 4);
        assert!(matches!(rules[0].selector, RuleSelector::Path(_)));
        assert!(rules[1].selector.is_type_rule());
        assert_eq!(rules[2].family(), RecordFamily::Tag);
        assert!(matches!(&rules[3].selector, RuleSelector::Vr(vr) if vr == "PN"));
        assert_eq!(rules[2].method(), "dateshift");
    }

    #[test]
    fn test_missing_selector() {
        let err = compile("[[rules]]\nmethod = \"redact\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSelector { index: 0 }));
    }

    #[test]
    fn test_ambiguous_selector() {
        let err = compile("[[rules]]\npath = \"Patient\"\ntag = \"(0010,0010)\"\nmethod = \"redact\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousSelector { .. }));
    }

    #[test]
    fn test_unsupported_and_missing_method() {
        let err = compile("[[rules]]\npath = \"Patient.name\"\nmethod = \"scramble\"\n").unwrap_err();
        assert!(err.to_string().contains("scramble"));
        let err = compile("[[rules]]\npath = \"Patient.name\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_invalid_expression_reports_rule() {
        let err = compile(
            "[[rules]]\npath = \"Patient.name\"\nmethod = \"keep\"\n\n[[rules]]\npath = \"Patient.name.where(\"\nmethod = \"redact\"\n",
        )
        .unwrap_err();
        match err {
            ConfigError::InvalidExpression { index, source_text, .. } => {
                assert_eq!(index, 1);
                assert!(source_text.contains("Patient.name.where("));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_setting_layers_and_validation() {
        let text = r#"
[default_settings.perturb]
span = 1
round_to = 2

[customized_settings.wide]
span = -4

[[rules]]
type = "Quantity"
method = "perturb"
setting = "wide"
"#;
        let err = compile(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));

        let fixed = text.replace("span = -4", "span = 4");
        assert!(compile(&fixed).is_ok());

        let inline = format!("{fixed}span = -1\n");
        assert!(compile(&inline).is_err());
    }

    #[test]
    fn test_unknown_named_setting() {
        let err = compile("[[rules]]\npath = \"Patient.name\"\nmethod = \"redact\"\nsetting = \"nope\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSetting { .. }));
    }

    #[test]
    fn test_unknown_tag_keyword() {
        let err = compile("[[rules]]\ntag = \"PatientShoeSize\"\nmethod = \"redact\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTag { .. }));
    }

    #[test]
    fn test_tag_rule_set_built() {
        let raw = RawDeidConfig::parse(
            "[[rules]]\ntag = \"(0010,0010)\"\nmethod = \"redact\"\n[[rules]]\nvr = \"DA\"\nmethod = \"dateshift\"\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        let (_, tags) = compile_rules(&raw, &ProcessorRegistry::new()).unwrap();
        assert_eq!(tags.resolve(crate::domain::Tag::new(0x0010, 0x0010), Some("PN")), Some(0));
        assert_eq!(tags.resolve(crate::domain::Tag::new(0x0008, 0x0020), Some("DA")), Some(1));
    }
}
