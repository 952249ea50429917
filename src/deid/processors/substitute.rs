//! `substitute`: merge a fixed replacement into the target subtree
//!
//! Children are paired by name and position. Paired children are merged recursively,
//! replacement-only children are appended and target-only children are dropped.
//! Anything a previous rule already finalized survives untouched: its value is
//! neither overwritten nor reintroduced, and it is never deleted.

use crate::adapters::fhir_json::element_from_json;
use crate::deid::config::settings::SubstituteSettings;
use crate::deid::result::ProcessResult;
use crate::domain::Node;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct SubstituteProcessor {
    replacement: Node,
}

impl SubstituteProcessor {
    pub fn new(settings: SubstituteSettings) -> Result<Self, String> {
        settings.validate()?;
        let replacement = match &settings.replace_with {
            JsonValue::Object(_) => element_from_json("replacement", &settings.replace_with),
            scalar => Node::leaf("replacement", "string", scalar_text(scalar)),
        };
        Ok(Self { replacement })
    }

    /// Merges the replacement into `node`, honouring the visited-node set
    pub fn substitute(&self, node: &mut Node, visited: &HashSet<String>) -> ProcessResult {
        merge(node, &self.replacement, visited);
        ProcessResult::substituted()
    }
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn merge(target: &mut Node, replacement: &Node, visited: &HashSet<String>) {
    if visited.contains(&target.location) {
        return;
    }
    target.value = replacement.value.clone();

    let mut existing = std::mem::take(&mut target.children);
    let mut names: Vec<String> = Vec::new();
    for name in existing.iter().map(|c| &c.name).chain(replacement.children.iter().map(|c| &c.name)) {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    let mut merged = Vec::new();
    for name in &names {
        let mut current: Vec<Node> = Vec::new();
        let mut i = 0;
        while i < existing.len() {
            if &existing[i].name == name {
                current.push(existing.remove(i));
            } else {
                i += 1;
            }
        }
        let incoming: Vec<&Node> = replacement.children_named(name).collect();

        let mut current = current.into_iter();
        let mut incoming = incoming.into_iter();
        loop {
            match (current.next(), incoming.next()) {
                (Some(mut old), Some(new)) => {
                    merge(&mut old, new, visited);
                    merged.push(old);
                }
                (Some(mut old), None) => {
                    if is_protected(&old, visited) {
                        clear_unvisited(&mut old, visited);
                        merged.push(old);
                    }
                }
                (None, Some(new)) => merged.push(new.clone()),
                (None, None) => break,
            }
        }
    }

    for child in merged {
        target.push_child(child);
    }
}

fn is_protected(node: &Node, visited: &HashSet<String>) -> bool {
    visited.contains(&node.location) || node.children.iter().any(|c| is_protected(c, visited))
}

fn clear_unvisited(node: &mut Node, visited: &HashSet<String>) {
    if visited.contains(&node.location) {
        return;
    }
    node.value = None;
    for child in &mut node.children {
        clear_unvisited(child, visited);
    }
}
