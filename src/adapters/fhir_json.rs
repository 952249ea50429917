//! FHIR-style JSON resources <-> record trees
//!
//! Field types are inferred from field names and value shapes, since plain JSON
//! carries no type information. Choice fields (`valueQuantity`, `deceasedDateTime`)
//! take the type named by their suffix. Objects carrying `resourceType` become
//! resource roots; JSON arrays become repeated children sharing the field name.

use crate::domain::{DeidError, Node, RecordFamily, RecordTree, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const RESOURCE_TYPE: &str = "resourceType";

/// Type suffixes recognized on choice fields, longest first
const CHOICE_SUFFIXES: &[(&str, &str)] = &[
    ("CodeableConcept", "CodeableConcept"),
    ("ContactPoint", "ContactPoint"),
    ("SampledData", "SampledData"),
    ("Attachment", "Attachment"),
    ("Identifier", "Identifier"),
    ("HumanName", "HumanName"),
    ("Reference", "Reference"),
    ("Quantity", "Quantity"),
    ("DateTime", "dateTime"),
    ("Duration", "Duration"),
    ("Address", "Address"),
    ("Boolean", "boolean"),
    ("Decimal", "decimal"),
    ("Instant", "instant"),
    ("Integer", "integer"),
    ("Period", "Period"),
    ("String", "string"),
    ("Coding", "Coding"),
    ("Range", "Range"),
    ("Ratio", "Ratio"),
    ("Money", "Money"),
    ("Date", "date"),
    ("Time", "time"),
    ("Code", "code"),
    ("Age", "Age"),
    ("Uri", "uri"),
    ("Url", "url"),
];

/// Complex types implied by common field names
const COMPLEX_FIELDS: &[(&str, &str)] = &[
    ("address", "Address"),
    ("name", "HumanName"),
    ("telecom", "ContactPoint"),
    ("identifier", "Identifier"),
    ("period", "Period"),
    ("meta", "Meta"),
    ("coding", "Coding"),
    ("security", "Coding"),
    ("tag", "Coding"),
    ("code", "CodeableConcept"),
    ("maritalStatus", "CodeableConcept"),
    ("text", "Narrative"),
    ("photo", "Attachment"),
];

/// Primitive types implied by common field names
const PRIMITIVE_FIELDS: &[(&str, &str)] = &[
    ("id", "id"),
    ("postalCode", "string"),
    ("url", "uri"),
    ("system", "uri"),
    ("fullUrl", "uri"),
    ("gender", "code"),
    ("status", "code"),
    ("use", "code"),
    ("code", "code"),
    ("language", "code"),
    ("birthDate", "date"),
    ("date", "dateTime"),
    ("recordedDate", "dateTime"),
    ("authoredOn", "dateTime"),
    ("start", "dateTime"),
    ("end", "dateTime"),
    ("lastUpdated", "instant"),
    ("issued", "instant"),
];

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}(-\d{2})?$").expect("valid date regex")
    })
}

fn date_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:\d{2})?$")
            .expect("valid dateTime regex")
    })
}

/// Builds a record tree from a JSON resource
pub fn tree_from_json(value: &Value) -> Result<RecordTree> {
    let resource_type = value
        .get(RESOURCE_TYPE)
        .and_then(Value::as_str)
        .ok_or_else(|| DeidError::Serialization("Record has no resourceType".to_string()))?;
    let root = element_from_json(resource_type, value);
    Ok(RecordTree::new(RecordFamily::Path, root))
}

/// Builds one element (and its subtree) from a JSON value
pub fn element_from_json(name: &str, value: &Value) -> Node {
    match value {
        Value::Object(map) => {
            let mut node = match map.get(RESOURCE_TYPE).and_then(Value::as_str) {
                Some(resource_type) => Node::resource(name, resource_type),
                None => Node::element(name, object_type(name, map)),
            };
            for (key, field) in map {
                if key != RESOURCE_TYPE || !node.is_resource() {
                    push_field(&mut node, key, field);
                }
            }
            node
        }
        Value::Array(_) => {
            let mut node = Node::element(name, "BackboneElement");
            push_field(&mut node, name, value);
            node
        }
        Value::String(text) => Node::leaf(name, string_type(name, text), text.as_str()),
        Value::Number(number) => {
            let instance_type = if name != "value" && (number.is_i64() || number.is_u64()) {
                "integer"
            } else {
                "decimal"
            };
            Node::leaf(name, instance_type, number.to_string())
        }
        Value::Bool(flag) => Node::leaf(name, "boolean", flag.to_string()),
        Value::Null => Node::element(name, "string"),
    }
}

fn push_field(parent: &mut Node, key: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                parent.push_child(element_from_json(key, item).as_repeated());
            }
        }
        other => parent.push_child(element_from_json(key, other)),
    }
}

fn choice_type(name: &str) -> Option<&'static str> {
    CHOICE_SUFFIXES.iter().find_map(|(suffix, instance_type)| {
        let stem = name.strip_suffix(suffix)?;
        stem.chars()
            .last()
            .filter(char::is_ascii_lowercase)
            .map(|_| *instance_type)
    })
}

fn object_type(name: &str, map: &Map<String, Value>) -> String {
    if let Some(instance_type) = choice_type(name) {
        return instance_type.to_string();
    }
    if map.contains_key("reference") {
        return "Reference".to_string();
    }
    COMPLEX_FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map_or("BackboneElement", |(_, t)| *t)
        .to_string()
}

fn string_type(name: &str, text: &str) -> &'static str {
    if let Some((_, instance_type)) = PRIMITIVE_FIELDS.iter().find(|(field, _)| *field == name) {
        return instance_type;
    }
    if let Some(instance_type) = choice_type(name) {
        return instance_type;
    }
    if date_regex().is_match(text) {
        "date"
    } else if date_time_regex().is_match(text) {
        "dateTime"
    } else {
        "string"
    }
}

/// Serializes a record tree back to a JSON resource
pub fn tree_to_json(tree: &RecordTree) -> Value {
    node_to_json(&tree.root)
}

fn node_to_json(node: &Node) -> Value {
    if node.is_resource() || !node.children.is_empty() {
        let mut map = Map::new();
        if node.is_resource() {
            map.insert(RESOURCE_TYPE.to_string(), Value::String(node.instance_type.clone()));
        }
        for (name, children) in group_children(node) {
            let repeated = children.len() > 1 || children.iter().any(|c| c.repeated);
            let value = if repeated {
                Value::Array(children.into_iter().map(node_to_json).collect())
            } else {
                node_to_json(children[0])
            };
            map.insert(name.to_string(), value);
        }
        return Value::Object(map);
    }
    match node.value.as_deref() {
        Some(text) => scalar_to_json(&node.instance_type, text),
        None => Value::Null,
    }
}

/// Children grouped by name, in order of first appearance
fn group_children(node: &Node) -> Vec<(&str, Vec<&Node>)> {
    let mut groups: Vec<(&str, Vec<&Node>)> = Vec::new();
    for child in &node.children {
        match groups.iter_mut().find(|(name, _)| *name == child.name) {
            Some((_, members)) => members.push(child),
            None => groups.push((child.name.as_str(), vec![child])),
        }
    }
    groups
}

fn scalar_to_json(instance_type: &str, text: &str) -> Value {
    match instance_type {
        "boolean" => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        "integer" | "positiveInt" | "unsignedInt" | "decimal" => {
            match serde_json::from_str::<Value>(text) {
                Ok(number @ Value::Number(_)) => number,
                _ => Value::String(text.to_string()),
            }
        }
        _ => Value::String(text.to_string()),
    }
}
