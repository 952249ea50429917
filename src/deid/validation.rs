//! Output validation of de-identified records
//!
//! A light structural check, enabled with `validate_output`. It does not validate
//! against a schema: it only confirms that rewritten identifiers, dates and
//! references are still well-formed.

use crate::deid::identifiers::ReferenceShape;
use crate::deid::processors::{is_date_type, parse_node_date};
use crate::domain::{Node, ProcessingError, RecordFamily};
use regex::Regex;
use std::sync::OnceLock;

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").expect("valid id regex"))
}

fn uid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+(\.[0-9]+)*$").expect("valid uid regex"))
}

/// Checks every node of a record, returning the first violation
pub fn validate(root: &Node, family: RecordFamily) -> Result<(), ProcessingError> {
    let mut failure = None;
    root.walk(&mut |_, node| {
        if failure.is_some() {
            return;
        }
        let Some(value) = node.value.as_deref() else {
            return;
        };
        let message = match family {
            RecordFamily::Path => check_path_node(node, value),
            RecordFamily::Tag => check_tag_node(node, value),
        };
        if let Some(message) = message {
            failure = Some(ProcessingError::ValidationFailed {
                location: node.location.clone(),
                message,
            });
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn check_path_node(node: &Node, value: &str) -> Option<String> {
    if node.instance_type == "id" && !id_regex().is_match(value) {
        return Some("identifier is not a valid id".to_string());
    }
    if node.name == "reference" && ReferenceShape::parse(value).is_none() {
        return Some("reference has an unknown shape".to_string());
    }
    if is_date_type(&node.instance_type) && parse_node_date(node).is_none() {
        return Some(format!("'{}' value does not parse", node.instance_type));
    }
    None
}

fn check_tag_node(node: &Node, value: &str) -> Option<String> {
    match node.instance_type.as_str() {
        "UI" if value.len() > 64 || !uid_regex().is_match(value) => {
            Some("UID is not a dotted decimal of at most 64 characters".to_string())
        }
        "DA" | "DT" if !value.is_empty() && parse_node_date(node).is_none() => {
            Some(format!("'{}' value does not parse", node.instance_type))
        }
        _ => None,
    }
}
