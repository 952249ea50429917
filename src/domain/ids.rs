//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers rules are written against: DICOM-style
//! attribute tags and FHIR-style resource type names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribute tag newtype wrapper
///
/// Packs the 16-bit group and element numbers into one `u32`. Accepts the
/// `(gggg,eeee)`, `gggg,eeee` and `ggggeeee` notations.
///
/// # Examples
///
/// ```
/// use deid::domain::ids::Tag;
/// use std::str::FromStr;
///
/// let tag = Tag::from_str("(0010,0010)").unwrap();
/// assert_eq!(tag.group(), 0x0010);
/// assert_eq!(tag.to_string(), "(0010,0010)");
/// assert_eq!(Tag::from_str("00100010").unwrap(), tag);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(u32);

impl Tag {
    /// Creates a tag from group and element numbers
    pub const fn new(group: u16, element: u16) -> Self {
        Self(((group as u32) << 16) | element as u32)
    }

    /// Creates a tag from its packed representation
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// Group number
    pub const fn group(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Element number
    pub const fn element(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Packed representation
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Compact eight-hex-digit form used by DICOM JSON (`00100010`)
    pub fn to_compact(&self) -> String {
        format!("{:08X}", self.0)
    }

    /// Private tags live in odd groups
    pub fn is_private(&self) -> bool {
        self.group() % 2 == 1
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group(), self.element())
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = normalize_tag_text(s);
        if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "Invalid tag '{s}'. Expected (gggg,eeee), gggg,eeee or ggggeeee"
            ));
        }
        u32::from_str_radix(&hex, 16)
            .map(Self)
            .map_err(|e| format!("Invalid tag '{s}': {e}"))
    }
}

/// Strips parentheses, comma and whitespace from a tag literal
pub(crate) fn normalize_tag_text(s: &str) -> String {
    s.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect()
}

/// Resource type name newtype wrapper
///
/// Resource type names start with an uppercase ASCII letter and contain only
/// alphanumerics (e.g. `Patient`, `Observation`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a new ResourceType from a string
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_uppercase() => {}
            _ => return Err(format!("Resource type '{name}' must start with an uppercase letter")),
        }
        if !chars.all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("Resource type '{name}' must be alphanumeric"));
        }
        Ok(Self(name))
    }

    /// Returns the resource type as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Resource` and `DomainResource` match every root type
    pub fn is_generic(&self) -> bool {
        self.0 == "Resource" || self.0 == "DomainResource"
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
