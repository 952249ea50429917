//! Record tree model
//!
//! A parsed record is a single-rooted tree of [`Node`]s. Each node is exclusively owned
//! by its parent. Nodes carry a field `name`, a semantic `instance_type` (a FHIR-style
//! type name such as `date` or `Patient`, or a VR for the tag family), an optional
//! scalar value and a structural `location` that is unique within the tree.
//!
//! Locations have the form `Patient.name[0].given[1]`: the parent's location, a dot,
//! the child name and the child's ordinal among siblings of the same name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index path from the root to a node (child positions)
pub type NodePath = Vec<usize>;

/// Structural role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Ordinary field
    Element,
    /// Root of a logical resource (type marker). Never pruned.
    Resource,
}

/// Record family a tree belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFamily {
    /// Path-addressed records (FHIR-style JSON resources)
    Path,
    /// Tag-addressed records (DICOM-style datasets)
    Tag,
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordFamily::Path => write!(f, "path"),
            RecordFamily::Tag => write!(f, "tag"),
        }
    }
}

impl std::str::FromStr for RecordFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "path" | "fhir" => Ok(RecordFamily::Path),
            "tag" | "dicom" => Ok(RecordFamily::Tag),
            other => Err(format!("Unknown record family '{other}'. Use: path, tag")),
        }
    }
}

/// One element of a parsed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Field name
    pub name: String,
    /// Semantic type
    pub instance_type: String,
    /// Optional scalar value
    pub value: Option<String>,
    /// Ordered children
    pub children: Vec<Node>,
    /// Structural location, unique within the tree
    pub location: String,
    /// Element or resource root
    pub kind: NodeKind,
    /// Whether the serialized form holds this node inside an array
    pub repeated: bool,
}

impl Node {
    /// Creates an element node without a value
    pub fn element(name: impl Into<String>, instance_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            location: name.clone(),
            name,
            instance_type: instance_type.into(),
            value: None,
            children: Vec::new(),
            kind: NodeKind::Element,
            repeated: false,
        }
    }

    /// Creates an element node carrying a scalar value
    pub fn leaf(
        name: impl Into<String>,
        instance_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut node = Self::element(name, instance_type);
        node.value = Some(value.into());
        node
    }

    /// Creates a resource root node
    pub fn resource(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let mut node = Self::element(name, resource_type);
        node.kind = NodeKind::Resource;
        node
    }

    /// Appends a child (builder style)
    pub fn with_child(mut self, child: Node) -> Self {
        self.push_child(child);
        self
    }

    /// Appends several children (builder style)
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        for child in children {
            self.push_child(child);
        }
        self
    }

    /// Marks the node as an array member (builder style)
    pub fn as_repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Appends a child and assigns its location
    pub fn push_child(&mut self, mut child: Node) {
        let ordinal = self.children.iter().filter(|c| c.name == child.name).count();
        child.relocate(child_location(&self.location, &child.name, ordinal));
        self.children.push(child);
    }

    /// Returns true for resource roots
    pub fn is_resource(&self) -> bool {
        self.kind == NodeKind::Resource
    }

    /// Returns true when the node has neither a value nor children
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First child with the given name, mutably
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// All children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Value of the first child with the given name
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.value.as_deref())
    }

    /// Node at an index path relative to this node
    pub fn at(&self, path: &[usize]) -> Option<&Node> {
        let mut node = self;
        for &idx in path {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    /// Mutable node at an index path relative to this node
    pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let mut node = self;
        for &idx in path {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }

    /// Reassigns this node's location and recomputes every descendant location
    pub fn relocate(&mut self, location: String) {
        self.location = location;
        let mut ordinals: HashMap<String, usize> = HashMap::new();
        for child in &mut self.children {
            let ordinal = ordinals.entry(child.name.clone()).or_insert(0);
            child.relocate(child_location(&self.location, &child.name, *ordinal));
            *ordinal += 1;
        }
    }

    /// Removes empty non-resource descendants, bottom-up
    ///
    /// The node itself is never removed. Locations are recomputed afterwards so they
    /// stay contiguous. Returns the number of nodes removed.
    pub fn prune_empty(&mut self) -> usize {
        let removed = self.prune_children();
        if removed > 0 {
            let location = self.location.clone();
            self.relocate(location);
        }
        removed
    }

    fn prune_children(&mut self) -> usize {
        let mut removed = 0;
        for child in &mut self.children {
            removed += child.prune_children();
        }
        let before = self.children.len();
        self.children.retain(|c| c.is_resource() || !c.is_empty());
        removed + (before - self.children.len())
    }

    /// Total number of nodes in this subtree, including self
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Visits every node of the subtree in document order with its index path
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&[usize], &'a Node)) {
        let mut path = Vec::new();
        walk_inner(self, &mut path, f);
    }
}

fn walk_inner<'a>(node: &'a Node, path: &mut Vec<usize>, f: &mut dyn FnMut(&[usize], &'a Node)) {
    f(path, node);
    for (idx, child) in node.children.iter().enumerate() {
        path.push(idx);
        walk_inner(child, path, f);
        path.pop();
    }
}

/// Builds a child location from its parent's location
pub fn child_location(parent: &str, name: &str, ordinal: usize) -> String {
    format!("{parent}.{name}[{ordinal}]")
}

/// A parsed record: a family marker plus the root node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTree {
    /// Record family
    pub family: RecordFamily,
    /// Root node
    pub root: Node,
}

impl RecordTree {
    /// Creates a record tree and normalizes every location
    pub fn new(family: RecordFamily, mut root: Node) -> Self {
        let location = root.name.clone();
        root.relocate(location);
        Self { family, root }
    }

    /// Runs the bottom-up null-pruning pass
    pub fn prune(&mut self) -> usize {
        self.root.prune_empty()
    }
}
