//! DICOM JSON datasets <-> record trees
//!
//! A dataset `{"00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^John"}]}}`
//! becomes a `Dataset` resource root whose children are named by tag, e.g.
//! `(0010,0010)`, with the VR as instance type. Multiple values are joined with a
//! backslash, as in the binary encoding. Sequence items become repeated `item`
//! children.

use crate::domain::{DeidError, Node, RecordFamily, RecordTree, Result, Tag};
use serde_json::{Map, Value};
use std::str::FromStr;

const DATASET: &str = "dataset";
const ITEM: &str = "item";
const SEPARATOR: char = '\\';

const NUMERIC_VRS: &[&str] = &["IS", "DS", "FL", "FD", "SL", "SS", "UL", "US", "SV", "UV"];
const BINARY_VRS: &[&str] = &["OB", "OD", "OF", "OL", "OV", "OW", "UN"];

/// Builds a record tree from a DICOM JSON dataset
pub fn tree_from_json(value: &Value) -> Result<RecordTree> {
    let map = value
        .as_object()
        .ok_or_else(|| DeidError::Serialization("Dataset must be a JSON object".to_string()))?;
    let mut root = Node::resource(DATASET, "Dataset");
    push_attributes(&mut root, map)?;
    Ok(RecordTree::new(RecordFamily::Tag, root))
}

fn push_attributes(parent: &mut Node, map: &Map<String, Value>) -> Result<()> {
    for (key, attribute) in map {
        let tag = Tag::from_str(key).map_err(DeidError::Serialization)?;
        parent.push_child(attribute_from_json(tag, attribute)?);
    }
    Ok(())
}

fn attribute_from_json(tag: Tag, attribute: &Value) -> Result<Node> {
    let vr = attribute.get("vr").and_then(Value::as_str).unwrap_or_default();
    let mut node = Node::element(tag.to_string(), vr);

    if let Some(inline) = attribute.get("InlineBinary").and_then(Value::as_str) {
        node.value = Some(inline.to_string());
        return Ok(node);
    }
    let Some(values) = attribute.get("Value").and_then(Value::as_array) else {
        return Ok(node);
    };

    if vr == "SQ" {
        for item in values {
            let item_map = item.as_object().ok_or_else(|| {
                DeidError::Serialization(format!("Sequence item of {tag} is not an object"))
            })?;
            let mut item_node = Node::element(ITEM, "Item").as_repeated();
            push_attributes(&mut item_node, item_map)?;
            node.push_child(item_node);
        }
        return Ok(node);
    }

    let parts: Vec<String> = values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Object(pn) => pn
                .get("Alphabetic")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect();
    node.value = Some(parts.join("\\"));
    Ok(node)
}

/// Serializes a record tree back to a DICOM JSON dataset
pub fn tree_to_json(tree: &RecordTree) -> Value {
    Value::Object(attributes_to_json(&tree.root))
}

fn attributes_to_json(parent: &Node) -> Map<String, Value> {
    let mut map = Map::new();
    for child in &parent.children {
        if let Ok(tag) = Tag::from_str(&child.name) {
            map.insert(tag.to_compact(), attribute_to_json(child));
        }
    }
    map
}

fn attribute_to_json(node: &Node) -> Value {
    let vr = node.instance_type.as_str();
    let mut attribute = Map::new();
    attribute.insert("vr".to_string(), Value::String(vr.to_string()));

    if vr == "SQ" {
        let items: Vec<Value> = node
            .children_named(ITEM)
            .map(|item| Value::Object(attributes_to_json(item)))
            .collect();
        if !items.is_empty() {
            attribute.insert("Value".to_string(), Value::Array(items));
        }
        return Value::Object(attribute);
    }

    let Some(text) = node.value.as_deref() else {
        return Value::Object(attribute);
    };
    if BINARY_VRS.contains(&vr) {
        attribute.insert("InlineBinary".to_string(), Value::String(text.to_string()));
        return Value::Object(attribute);
    }

    let values: Vec<Value> = text
        .split(SEPARATOR)
        .map(|part| {
            if vr == "PN" {
                let mut name = Map::new();
                name.insert("Alphabetic".to_string(), Value::String(part.to_string()));
                return Value::Object(name);
            }
            if NUMERIC_VRS.contains(&vr) {
                if let Ok(number @ Value::Number(_)) = serde_json::from_str::<Value>(part) {
                    return number;
                }
            }
            Value::String(part.to_string())
        })
        .collect();
    attribute.insert("Value".to_string(), Value::Array(values));
    Value::Object(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Value {
        json!({
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^John"}]},
            "00100020": {"vr": "LO", "Value": ["PID-1"]},
            "00100030": {"vr": "DA", "Value": ["19741225"]},
            "00200013": {"vr": "IS", "Value": [4]},
            "00081115": {"vr": "SQ", "Value": [
                {"0020000E": {"vr": "UI", "Value": ["1.2.3.4"]}}
            ]},
            "00080008": {"vr": "CS", "Value": ["ORIGINAL", "PRIMARY"]}
        })
    }

    #[test]
    fn test_attributes_named_by_tag() {
        let tree = tree_from_json(&dataset()).unwrap();
        let root = &tree.root;
        assert_eq!(tree.family, RecordFamily::Tag);
        assert_eq!(root.child_value("(0010,0010)"), Some("Doe^John"));
        assert_eq!(root.child("(0010,0030)").unwrap().instance_type, "DA");
        assert_eq!(root.child_value("(0008,0008)"), Some("ORIGINAL\\PRIMARY"));
        assert_eq!(root.child_value("(0020,0013)"), Some("4"));

        let item = root.child("(0008,1115)").unwrap().child("item").unwrap();
        assert_eq!(item.child_value("(0020,000E)"), Some("1.2.3.4"));
        assert_eq!(item.location, "dataset.(0008,1115)[0].item[0]");
    }

    #[test]
    fn test_round_trip() {
        let input = dataset();
        let tree = tree_from_json(&input).unwrap();
        assert_eq!(tree_to_json(&tree), input);
    }

    #[test]
    fn test_rejects_non_tag_keys() {
        assert!(tree_from_json(&json!({"PatientName": {"vr": "PN"}})).is_err());
        assert!(tree_from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_empty_attribute_keeps_vr_only() {
        let tree = RecordTree::new(
            RecordFamily::Tag,
            Node::resource("dataset", "Dataset").with_child(Node::element("(0010,0010)", "PN")),
        );
        assert_eq!(tree_to_json(&tree), json!({"00100010": {"vr": "PN"}}));
    }
}
