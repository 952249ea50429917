//! `redact`: clear a value, or keep a coarse part of it in partial modes

use super::{is_date_type, parse_node_date, ProcessContext, Processor};
use crate::deid::config::settings::RedactSettings;
use crate::deid::datetime::years_since;
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};

const ZIP_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct RedactProcessor {
    settings: RedactSettings,
}

impl RedactProcessor {
    pub fn new(settings: RedactSettings) -> Result<Self, String> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &RedactSettings {
        &self.settings
    }

    fn redact_date(&self, node: &mut Node) -> ProcessResult {
        match parse_node_date(node) {
            Some(date) if years_since(date.year()) <= self.settings.age_threshold as i32 => {
                node.value = Some(date.truncate_to_year().to_string());
            }
            _ => node.value = None,
        }
        ProcessResult::redacted()
    }

    fn redact_age(&self, node: &mut Node) -> ProcessResult {
        let years = node.value.as_deref().and_then(|v| age_in_years(v, &node.instance_type));
        match years {
            Some(age) if age <= f64::from(self.settings.age_threshold) => ProcessResult::default(),
            _ => {
                node.value = None;
                ProcessResult::redacted()
            }
        }
    }

    fn redact_zip(&self, node: &mut Node) -> ProcessResult {
        let Some(value) = node.value.as_deref() else {
            return ProcessResult::default();
        };
        let restricted = self
            .settings
            .restricted_zip_code_prefixes
            .iter()
            .any(|prefix| value.starts_with(prefix.as_str()));
        let keep = if restricted { 0 } else { ZIP_PREFIX_LEN };
        node.value = Some(zero_digits_after(value, keep));
        ProcessResult::redacted()
    }
}

impl Processor for RedactProcessor {
    fn name(&self) -> &str {
        "redact"
    }

    fn applies_to(&self, _node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        true
    }

    fn process(&self, node: &mut Node, ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        if node.value.is_none() {
            return Ok(ProcessResult::default());
        }

        let result = if self.settings.enable_partial_dates && is_date_type(&node.instance_type) {
            self.redact_date(node)
        } else if self.settings.enable_partial_ages && is_age_node(node, ctx) {
            self.redact_age(node)
        } else if self.settings.enable_partial_zip_codes && is_postal_code_node(node) {
            self.redact_zip(node)
        } else {
            node.value = None;
            ProcessResult::redacted()
        };
        Ok(result)
    }
}

/// Age-typed values: DICOM `AS` or the `value` of an `Age` quantity
pub fn is_age_node(node: &Node, ctx: &ProcessContext<'_>) -> bool {
    node.instance_type == "AS" || (node.name == "value" && ctx.parent_type == Some("Age"))
}

fn is_postal_code_node(node: &Node) -> bool {
    node.name == "postalCode"
}

/// Age in years from an `AS` string (`045Y`, `030M`) or a plain number
fn age_in_years(value: &str, instance_type: &str) -> Option<f64> {
    let value = value.trim();
    if instance_type != "AS" {
        return value.parse().ok();
    }
    let unit = value.chars().last()?;
    let number: f64 = value[..value.len() - unit.len_utf8()].parse().ok()?;
    let divisor = match unit {
        'D' => 365.0,
        'W' => 52.0,
        'M' => 12.0,
        'Y' => 1.0,
        _ => return None,
    };
    Some(number / divisor)
}

fn zero_digits_after(value: &str, keep: usize) -> String {
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i >= keep && c.is_ascii_digit() { '0' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::params;
    use super::*;
    use crate::domain::RecordFamily;
    use chrono::Datelike;

    fn processor(settings: RedactSettings) -> RedactProcessor {
        RedactProcessor::new(settings).unwrap()
    }

    fn partial() -> RedactSettings {
        RedactSettings {
            enable_partial_dates: true,
            enable_partial_ages: true,
            enable_partial_zip_codes: true,
            restricted_zip_code_prefixes: vec!["036".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_full_redaction_clears_value() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1");
        let mut node = Node::leaf("birthDate", "date", "1974-12-25");

        let result = processor(RedactSettings::default()).process(&mut node, &ctx).unwrap();
        assert!(result.redacted);
        assert_eq!(node.value, None);
    }

    #[test]
    fn test_partial_date_keeps_year() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1");
        let mut node = Node::leaf("birthDate", "date", "1974-12-25");

        processor(partial()).process(&mut node, &ctx).unwrap();
        assert_eq!(node.value.as_deref(), Some("1974"));

        let mut dicom = Node::leaf("(0010,0030)", "DA", "19741225");
        processor(partial()).process(&mut dicom, &ctx).unwrap();
        assert_eq!(dicom.value.as_deref(), Some("19740101"));
    }

    #[test]
    fn test_partial_date_clears_very_old_dates() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1");
        let old_year = chrono::Utc::now().year() - 95;
        let mut node = Node::leaf("birthDate", "date", format!("{old_year}-01-01"));

        processor(partial()).process(&mut node, &ctx).unwrap();
        assert_eq!(node.value, None);
    }

    #[test]
    fn test_partial_ages() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1").with_parent(Some("Age"));

        let mut young = Node::leaf("value", "decimal", "45");
        let result = processor(partial()).process(&mut young, &ctx).unwrap();
        assert_eq!(young.value.as_deref(), Some("45"));
        assert!(!result.redacted);

        let mut old = Node::leaf("value", "decimal", "92");
        processor(partial()).process(&mut old, &ctx).unwrap();
        assert_eq!(old.value, None);

        let mut dicom_age = Node::leaf("(0010,1010)", "AS", "095Y");
        processor(partial()).process(&mut dicom_age, &ctx).unwrap();
        assert_eq!(dicom_age.value, None);

        let mut months = Node::leaf("(0010,1010)", "AS", "030M");
        processor(partial()).process(&mut months, &ctx).unwrap();
        assert_eq!(months.value.as_deref(), Some("030M"));
    }

    #[test]
    fn test_malformed_age_is_cleared() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Tag, "p1");

        for raw in ["045é", "Y", "", "abcY"] {
            let mut age = Node::leaf("(0010,1010)", "AS", raw);
            let result = processor(partial()).process(&mut age, &ctx).unwrap();
            assert!(result.redacted);
            assert_eq!(age.value, None);
        }
    }

    #[test]
    fn test_partial_zip_codes() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1");

        let mut zip = Node::leaf("postalCode", "string", "98052-1234");
        processor(partial()).process(&mut zip, &ctx).unwrap();
        assert_eq!(zip.value.as_deref(), Some("98000-0000"));

        let mut restricted = Node::leaf("postalCode", "string", "03601");
        processor(partial()).process(&mut restricted, &ctx).unwrap();
        assert_eq!(restricted.value.as_deref(), Some("00000"));
    }

    #[test]
    fn test_disabled_partial_mode_clears() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1");
        let mut zip = Node::leaf("postalCode", "string", "98052");
        processor(RedactSettings::default()).process(&mut zip, &ctx).unwrap();
        assert_eq!(zip.value, None);
    }
}
