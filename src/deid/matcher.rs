//! Rule-to-node matching for one resource
//!
//! Each resource frame builds one [`NodeIndex`] of its own descendants (nested
//! resources excluded) keyed by type and by name. Anchored selectors start from an
//! index lookup; everything else evaluates the full selector against the root.

use crate::deid::expression::{ExpressionError, Item};
use crate::deid::selector::{Anchor, Selector};
use crate::domain::{Node, NodePath};
use std::collections::HashMap;

/// Descendants of one resource root, indexed once per resource
#[derive(Debug, Default)]
pub struct NodeIndex {
    by_type: HashMap<String, Vec<NodePath>>,
    by_name: HashMap<String, Vec<NodePath>>,
}

impl NodeIndex {
    pub fn build(root: &Node) -> Self {
        let mut items = Vec::new();
        crate::deid::expression::eval::push_descendants(root, &Vec::new(), &mut items);

        let mut index = Self::default();
        for item in items {
            if let Item::Node(node, path) = item {
                index
                    .by_type
                    .entry(node.instance_type.clone())
                    .or_default()
                    .push(path.clone());
                index.by_name.entry(node.name.clone()).or_default().push(path);
            }
        }
        index
    }

    pub fn lookup(&self, anchor: &Anchor) -> &[NodePath] {
        let found = match anchor {
            Anchor::Type(t) => self.by_type.get(t),
            Anchor::Name(n) => self.by_name.get(n),
        };
        found.map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Nodes of `root` targeted by `selector`, in document order
pub fn resolve(selector: &Selector, root: &Node, index: &NodeIndex) -> Result<Vec<NodePath>, ExpressionError> {
    if !selector.accepts_root(&root.instance_type) {
        return Ok(Vec::new());
    }

    let Some((anchor, rest)) = selector.anchored() else {
        return selector.expression().select(root);
    };

    let paths = index.lookup(anchor);
    if matches!(rest.expr(), crate::deid::expression::Expr::Focus) {
        return Ok(paths.to_vec());
    }

    let focus: Vec<Item<'_>> = paths
        .iter()
        .filter_map(|path| root.at(path).map(|node| Item::Node(node, path.clone())))
        .collect();
    let mut selected = rest.select_from(&focus)?;
    selected.sort();
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Node {
        let mut root = Node::resource("Patient", "Patient")
            .with_child(Node::leaf("id", "id", "example"))
            .with_child(
                Node::element("address", "Address")
                    .as_repeated()
                    .with_child(Node::leaf("city", "string", "Seattle"))
                    .with_child(
                        Node::element("period", "Period")
                            .with_child(Node::leaf("start", "dateTime", "2010-03-23")),
                    ),
            )
            .with_child(
                Node::element("contact", "BackboneElement").with_child(
                    Node::element("address", "Address")
                        .with_child(Node::leaf("city", "string", "Tacoma")),
                ),
            )
            .with_child(
                Node::resource("contained", "Organization")
                    .with_child(Node::element("address", "Address")),
            );
        root.relocate("Patient".to_string());
        root
    }

    fn locations(root: &Node, paths: &[NodePath]) -> Vec<String> {
        paths
            .iter()
            .map(|p| root.at(p).unwrap().location.clone())
            .collect()
    }

    #[test]
    fn test_type_lookup_excludes_nested_resources() {
        let root = patient();
        let index = NodeIndex::build(&root);
        let selector = Selector::for_type("Address").unwrap();
        let paths = resolve(&selector, &root, &index).unwrap();
        assert_eq!(
            locations(&root, &paths),
            vec!["Patient.address[0]", "Patient.contact[0].address[0]"]
        );
    }

    #[test]
    fn test_anchored_chain() {
        let root = patient();
        let index = NodeIndex::build(&root);
        let selector = Selector::compile("nodesByType('Address').city").unwrap();
        let paths = resolve(&selector, &root, &index).unwrap();
        assert_eq!(
            locations(&root, &paths),
            vec!["Patient.address[0].city[0]", "Patient.contact[0].address[0].city[0]"]
        );
    }

    #[test]
    fn test_root_type_filter() {
        let root = patient();
        let index = NodeIndex::build(&root);
        let selector = Selector::compile("Observation.code").unwrap();
        assert!(resolve(&selector, &root, &index).unwrap().is_empty());
    }

    #[test]
    fn test_rule_naming_the_root_type_matches_root() {
        let root = patient();
        let index = NodeIndex::build(&root);
        let selector = Selector::compile("Patient").unwrap();
        assert_eq!(resolve(&selector, &root, &index).unwrap(), vec![Vec::<usize>::new()]);

        let nested = &root.children[3];
        let nested_index = NodeIndex::build(nested);
        let org = Selector::compile("Organization").unwrap();
        assert_eq!(resolve(&org, nested, &nested_index).unwrap(), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_general_selector() {
        let root = patient();
        let index = NodeIndex::build(&root);
        let selector = Selector::compile("Patient.address.where(city = 'Seattle')").unwrap();
        let paths = resolve(&selector, &root, &index).unwrap();
        assert_eq!(locations(&root, &paths), vec!["Patient.address[0]"]);
    }
}
