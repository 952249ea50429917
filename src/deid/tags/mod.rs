//! Tag-family rule selection
//!
//! Tags are static, so tag rules are resolved into a lookup table once at
//! configuration load. Lookup precedence is exact tag, then masked tag, then VR;
//! within each class the first declared rule wins.

pub mod dictionary;

use crate::domain::ids::normalize_tag_text;
use crate::domain::Tag;
use std::collections::HashMap;
use std::fmt;

/// A tag selector: one exact tag or a wildcard mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPattern {
    Exact(Tag),
    /// Matches tags where `tag & mask == value`
    Masked { value: u32, mask: u32 },
}

impl TagPattern {
    /// Parses `(gggg,eeee)`, `gggg,eeee`, `ggggeeee`, a masked form such as
    /// `(50xx,xxxx)`, or a dictionary keyword
    pub fn parse(text: &str) -> Result<Self, String> {
        if let Some(entry) = dictionary::by_keyword(text.trim()) {
            return Ok(TagPattern::Exact(entry.tag));
        }

        let hex = normalize_tag_text(text);
        if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit() || c == 'x' || c == 'X') {
            return Err(format!(
                "'{text}' is neither a tag, a masked tag nor a known keyword"
            ));
        }

        let mut value = 0u32;
        let mut mask = 0u32;
        for c in hex.chars() {
            value <<= 4;
            mask <<= 4;
            if let Some(digit) = c.to_digit(16) {
                value |= digit;
                mask |= 0xF;
            }
        }
        Ok(if mask == u32::MAX {
            TagPattern::Exact(Tag::from_u32(value))
        } else {
            TagPattern::Masked { value, mask }
        })
    }

    pub fn matches(&self, tag: Tag) -> bool {
        match self {
            TagPattern::Exact(t) => *t == tag,
            TagPattern::Masked { value, mask } => tag.as_u32() & mask == *value,
        }
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagPattern::Exact(tag) => write!(f, "{tag}"),
            TagPattern::Masked { value, mask } => {
                let digit = |shift: u32| {
                    if (mask >> shift) & 0xF == 0 {
                        'x'
                    } else {
                        char::from_digit((value >> shift) & 0xF, 16)
                            .map(|c| c.to_ascii_uppercase())
                            .unwrap_or('?')
                    }
                };
                let group: String = (4..8).rev().map(|i| digit(i * 4)).collect();
                let element: String = (0..4).rev().map(|i| digit(i * 4)).collect();
                write!(f, "({group},{element})")
            }
        }
    }
}

/// Load-time lookup table from tags to rule indices
#[derive(Debug, Clone, Default)]
pub struct TagRuleSet {
    exact: HashMap<Tag, usize>,
    masked: Vec<(TagPattern, usize)>,
    vr: HashMap<String, usize>,
}

impl TagRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tag rule; an earlier rule for the same exact tag is kept
    pub fn insert_pattern(&mut self, pattern: TagPattern, rule: usize) {
        match pattern {
            TagPattern::Exact(tag) => {
                self.exact.entry(tag).or_insert(rule);
            }
            masked => self.masked.push((masked, rule)),
        }
    }

    /// Registers a VR rule; an earlier rule for the same VR is kept
    pub fn insert_vr(&mut self, vr: &str, rule: usize) {
        self.vr.entry(vr.to_uppercase()).or_insert(rule);
    }

    /// Rule index for an attribute, if any rule selects it
    pub fn resolve(&self, tag: Tag, vr: Option<&str>) -> Option<usize> {
        if let Some(rule) = self.exact.get(&tag) {
            return Some(*rule);
        }
        if let Some((_, rule)) = self.masked.iter().find(|(p, _)| p.matches(tag)) {
            return Some(*rule);
        }
        vr.and_then(|vr| self.vr.get(&vr.to_uppercase()).copied())
    }

    /// Whether any rule selects by VR alone
    pub fn has_vr_rules(&self) -> bool {
        !self.vr.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.masked.is_empty() && self.vr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use test_case::test_case;

    #[test_case("(0010,0010)", true ; "parenthesized")]
    #[test_case("0010,0010", true ; "comma")]
    #[test_case("00100010", true ; "compact")]
    #[test_case("PatientName", true ; "keyword")]
    #[test_case("(0010,xxxx)", false ; "masked")]
    fn test_parse_patterns(text: &str, exact: bool) {
        let pattern = TagPattern::parse(text).unwrap();
        assert_eq!(matches!(pattern, TagPattern::Exact(_)), exact);
        assert!(pattern.matches(Tag::new(0x0010, 0x0010)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TagPattern::parse("NotAKeyword").is_err());
        assert!(TagPattern::parse("(0010,00)").is_err());
    }

    #[test]
    fn test_masked_display() {
        let pattern = TagPattern::parse("(50xx,xxxx)").unwrap();
        assert_eq!(pattern.to_string(), "(50xx,xxxx)");
        assert!(pattern.matches(Tag::from_str("(5010,3000)").unwrap()));
        assert!(!pattern.matches(Tag::from_str("(6010,3000)").unwrap()));
    }

    #[test]
    fn test_precedence() {
        let mut rules = TagRuleSet::new();
        rules.insert_vr("PN", 0);
        rules.insert_pattern(TagPattern::parse("(0010,xxxx)").unwrap(), 1);
        rules.insert_pattern(TagPattern::parse("PatientName").unwrap(), 2);
        rules.insert_pattern(TagPattern::parse("(0010,0010)").unwrap(), 3);

        assert_eq!(rules.resolve(Tag::new(0x0010, 0x0010), Some("PN")), Some(2));
        assert_eq!(rules.resolve(Tag::new(0x0010, 0x1001), Some("PN")), Some(1));
        assert_eq!(rules.resolve(Tag::new(0x0008, 0x0090), Some("pn")), Some(0));
        assert_eq!(rules.resolve(Tag::new(0x0008, 0x0090), Some("LO")), None);
    }
}
