//! Scalar values produced by expression evaluation

use crate::deid::datetime::PartialDateTime;
use crate::domain::Node;
use std::cmp::Ordering;
use std::fmt;

/// A scalar expression value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    /// Date or date-time, kept in its original text form
    Date(String),
}

impl Value {
    /// Builds a date value if the text parses as a (partial) date
    pub fn date(text: &str) -> Option<Self> {
        PartialDateTime::parse_any(text).map(|_| Value::Date(text.to_string()))
    }

    /// Typed value of a node, based on its instance type
    pub fn from_node(node: &Node) -> Option<Self> {
        let raw = node.value.as_deref()?;
        let typed = match node.instance_type.as_str() {
            "boolean" => raw.parse().ok().map(Value::Bool),
            "integer" | "positiveInt" | "unsignedInt" | "integer64" | "IS" | "US" | "SS" | "UL"
            | "SL" | "UV" | "SV" => raw.trim().parse().ok().map(Value::Integer),
            "decimal" | "DS" | "FL" | "FD" => raw.trim().parse().ok().map(Value::Decimal),
            "date" | "dateTime" | "instant" | "DA" | "DT" => Value::date(raw),
            _ => None,
        };
        Some(typed.unwrap_or_else(|| Value::String(raw.to_string())))
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Date(_) => "date",
        }
    }

    /// Numeric view, converting integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Compares two values of compatible types
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => {
                let a = PartialDateTime::parse_any(a)?;
                let b = PartialDateTime::parse_any(b)?;
                a.partial_cmp(&b)
            }
            // A date node whose text did not parse as a date compares as a string.
            (Value::Date(a), Value::String(b)) | (Value::String(a), Value::Date(b)) => {
                Value::Date(a.clone()).compare(&Value::date(b)?).or_else(|| Some(a.cmp(b)))
            }
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// Equality with numeric coercion
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Equivalence: case-insensitive, whitespace-normalized for strings
    pub fn equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => normalize(a) == normalize(b),
            _ => self.equals(other),
        }
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) | Value::Date(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_node_types() {
        assert_eq!(
            Value::from_node(&Node::leaf("n", "integer", "42")),
            Some(Value::Integer(42))
        );
        assert_eq!(
            Value::from_node(&Node::leaf("n", "DS", " 1.5")),
            Some(Value::Decimal(1.5))
        );
        assert_eq!(
            Value::from_node(&Node::leaf("n", "date", "2020-01")),
            Some(Value::Date("2020-01".into()))
        );
        assert_eq!(
            Value::from_node(&Node::leaf("n", "integer", "abc")),
            Some(Value::String("abc".into()))
        );
        assert_eq!(Value::from_node(&Node::element("n", "string")), None);
    }

    #[test]
    fn test_numeric_coercion() {
        assert!(Value::Integer(2).equals(&Value::Decimal(2.0)));
        assert_eq!(
            Value::Integer(1).compare(&Value::Decimal(1.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Integer(1).compare(&Value::String("1".into())), None);
    }

    #[test]
    fn test_date_comparison() {
        let a = Value::date("2019-12-31").unwrap();
        let b = Value::date("2020").unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn test_equivalence() {
        assert!(Value::String(" Official  Name".into()).equivalent(&Value::String("official name".into())));
        assert!(!Value::String("a".into()).equals(&Value::String("A".into())));
    }
}
