//! Traversal visitor
//!
//! Walks a record tree one logical resource at a time. Each resource gets a frame
//! holding its visited-node set and its aggregate [`ProcessResult`]. Within a frame
//! path rules run first in declaration order, then type rules ordered by the depth
//! of the matched node (deepest first), then the identifier pass. Nested resources
//! (bundle entries, contained resources) are visited as frames of their own; on exit
//! their aggregate is merged into the enclosing frame and security labels are
//! attached to the resource root, except for contained resources.

use crate::deid::config::{DeidConfiguration, ErrorPolicy};
use crate::deid::identifiers::IdentifierTransformer;
use crate::deid::matcher::{self, NodeIndex};
use crate::deid::processors::{apply_checked, ProcessContext, Processor, RuleProcessor};
use crate::deid::result::{attach_path_labels, attach_tag_labels, ProcessResult};
use crate::deid::rules::Rule;
use crate::deid::tags::dictionary;
use crate::domain::{Node, NodeKind, NodePath, ProcessingError, RecordFamily, Tag};
use std::collections::HashSet;
use std::str::FromStr;

/// Field name under which a resource is embedded without its own labels
const CONTAINED: &str = "contained";

/// Attribute holding the scope identifier of a tag-family dataset
const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);

/// Effects of visiting one tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitOutcome {
    /// Aggregate result of the root resource, nested resources included
    pub result: ProcessResult,
    /// Resources replaced by a placeholder under the `skip` policy
    pub skipped_resources: usize,
    /// Rule applications across all frames
    pub rules_applied: usize,
}

#[derive(Debug, Default)]
struct Frame {
    visited: HashSet<String>,
    result: ProcessResult,
    rules_applied: usize,
    skipped_resources: usize,
}

pub struct Visitor<'a> {
    config: &'a DeidConfiguration,
    identifiers: &'a IdentifierTransformer,
}

impl<'a> Visitor<'a> {
    pub fn new(config: &'a DeidConfiguration, identifiers: &'a IdentifierTransformer) -> Self {
        Self { config, identifiers }
    }

    /// Visits a whole tree rooted at a resource
    pub fn visit(&self, family: RecordFamily, root: &mut Node) -> Result<VisitOutcome, ProcessingError> {
        let mut outcome = VisitOutcome::default();
        let frame = match family {
            RecordFamily::Path => self.guarded(root, |v, node| v.visit_resource(node, false)),
            RecordFamily::Tag => self.guarded(root, |v, node| v.visit_dataset(node)),
        }?;
        outcome.result = frame.result;
        outcome.rules_applied = frame.rules_applied;
        outcome.skipped_resources = frame.skipped_resources;
        Ok(outcome)
    }

    /// Runs a frame, replacing the resource by a placeholder on error under `skip`
    fn guarded(
        &self,
        resource: &mut Node,
        visit: impl FnOnce(&Self, &mut Node) -> Result<Frame, ProcessingError>,
    ) -> Result<Frame, ProcessingError> {
        match visit(self, resource) {
            Ok(frame) => Ok(frame),
            Err(err) if self.config.parameters().on_error == ErrorPolicy::Skip => {
                tracing::warn!(
                    location = %resource.location,
                    error = %err,
                    "Resource replaced by an empty placeholder"
                );
                make_placeholder(resource);
                Ok(Frame {
                    skipped_resources: 1,
                    ..Frame::default()
                })
            }
            Err(err) => Err(err),
        }
    }

    fn visit_resource(&self, resource: &mut Node, contained: bool) -> Result<Frame, ProcessingError> {
        let mut frame = Frame::default();
        let params = self.config.parameters();
        let scope_id = resource.child_value("id").unwrap_or_default().to_string();
        let ctx = ProcessContext::new(params, RecordFamily::Path, &scope_id);

        let index = NodeIndex::build(resource);
        let rules: Vec<&Rule> = self.config.rules_for(RecordFamily::Path).collect();

        for rule in rules.iter().filter(|r| !r.selector.is_type_rule()) {
            let Some(selector) = rule.selector.path_selector() else {
                continue;
            };
            let paths = matcher::resolve(selector, resource, &index)
                .map_err(|e| expression_error(resource, e))?;
            for path in paths {
                self.apply_rule(rule, resource, &path, &ctx, &mut frame)?;
            }
        }

        let mut typed_matches: Vec<(usize, usize, NodePath)> = Vec::new();
        for rule in rules.iter().filter(|r| r.selector.is_type_rule()) {
            let Some(selector) = rule.selector.path_selector() else {
                continue;
            };
            let paths = matcher::resolve(selector, resource, &index)
                .map_err(|e| expression_error(resource, e))?;
            typed_matches.extend(paths.into_iter().map(|p| (p.len(), rule.index, p)));
        }
        typed_matches.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        for (_, rule_index, path) in typed_matches {
            if let Some(rule) = self.config.rule(rule_index) {
                self.apply_rule(rule, resource, &path, &ctx, &mut frame)?;
            }
        }

        if params.pseudonymize_identifiers {
            self.identifiers.apply(resource, &frame.visited, params)?;
        }

        for path in nested_resource_paths(resource) {
            let Some(nested) = resource.at_mut(&path) else {
                continue;
            };
            if frame.visited.contains(&nested.location) {
                continue;
            }
            let is_contained = nested.name == CONTAINED;
            let child = self.guarded(nested, |v, node| v.visit_resource(node, is_contained))?;
            frame.result.merge(&child.result);
            frame.rules_applied += child.rules_applied;
            frame.skipped_resources += child.skipped_resources;
        }

        if !contained {
            if let Some(meta_idx) = attach_path_labels(resource, &frame.result) {
                mark_subtree(&resource.children[meta_idx], &mut frame.visited);
            }
        }
        Ok(frame)
    }

    fn visit_dataset(&self, dataset: &mut Node) -> Result<Frame, ProcessingError> {
        let mut frame = Frame::default();
        let params = self.config.parameters();
        let patient_id = PATIENT_ID.to_string();
        let scope_id = dataset.child_value(&patient_id).unwrap_or_default().to_string();
        let ctx = ProcessContext::new(params, RecordFamily::Tag, &scope_id);
        let tag_rules = self.config.tag_rules();

        let mut attributes: Vec<(NodePath, Tag)> = Vec::new();
        dataset.walk(&mut |path, node| {
            if let Ok(tag) = Tag::from_str(&node.name) {
                attributes.push((path.to_vec(), tag));
            }
        });

        for (path, tag) in attributes {
            let Some(node) = dataset.at_mut(&path) else {
                continue;
            };
            let declared_vr = (!node.instance_type.is_empty()).then(|| node.instance_type.clone());
            let vr = declared_vr.or_else(|| dictionary::vr_of(tag).map(str::to_string));
            let Some(rule_index) = tag_rules.resolve(tag, vr.as_deref()) else {
                if vr.is_none() && tag_rules.has_vr_rules() {
                    return Err(unknown_tag(node, tag));
                }
                continue;
            };
            let Some(vr) = vr else {
                return Err(unknown_tag(node, tag));
            };
            node.instance_type = vr;

            if let Some(rule) = self.config.rule(rule_index) {
                self.apply_rule(rule, dataset, &path, &ctx, &mut frame)?;
            }
        }

        for idx in attach_tag_labels(dataset, &frame.result) {
            mark_subtree(&dataset.children[idx], &mut frame.visited);
        }
        Ok(frame)
    }

    /// Applies one rule to one target node of the frame root
    fn apply_rule(
        &self,
        rule: &Rule,
        root: &mut Node,
        path: &[usize],
        ctx: &ProcessContext<'_>,
        frame: &mut Frame,
    ) -> Result<(), ProcessingError> {
        let parent_type = match path.split_last() {
            Some((_, parent)) => root.at(parent).map(|p| p.instance_type.clone()),
            None => None,
        };
        let Some(node) = root.at_mut(path) else {
            return Ok(());
        };
        if frame.visited.contains(&node.location) {
            return Ok(());
        }

        let result = match &rule.processor {
            RuleProcessor::Keep => {
                mark_subtree(node, &mut frame.visited);
                ProcessResult::default()
            }
            RuleProcessor::Remove => {
                clear_unvisited(node, &frame.visited);
                if node.is_resource() && !path.is_empty() {
                    node.kind = NodeKind::Element;
                }
                mark_subtree(node, &mut frame.visited);
                ProcessResult::redacted()
            }
            RuleProcessor::Substitute(substitute) => {
                let result = substitute.substitute(node, &frame.visited);
                mark_subtree(node, &mut frame.visited);
                result
            }
            other => {
                let Some(processor) = other.value_processor() else {
                    return Err(ProcessingError::MethodNotApplicable {
                        method: other.name().to_string(),
                        location: node.location.clone(),
                    });
                };
                let node_ctx = ctx.with_parent(parent_type.as_deref());
                let mut result = apply_checked(processor, node, &node_ctx)?;
                frame.visited.insert(node.location.clone());
                process_descendants(processor, node, ctx, &mut frame.visited, &mut result)?;
                result
            }
        };

        crate::log_rule_applied!(rule.index, rule.method(), node.location);
        frame.result.merge(&result);
        frame.rules_applied += 1;
        Ok(())
    }
}

/// Applies a value processor to every unvisited descendant it can handle
fn process_descendants(
    processor: &dyn Processor,
    node: &mut Node,
    ctx: &ProcessContext<'_>,
    visited: &mut HashSet<String>,
    result: &mut ProcessResult,
) -> Result<(), ProcessingError> {
    let parent_type = node.instance_type.clone();
    for child in &mut node.children {
        if child.is_resource() {
            continue;
        }
        if !visited.contains(&child.location) {
            let child_ctx = ctx.with_parent(Some(&parent_type));
            if processor.applies_to(child, &child_ctx) {
                result.merge(&processor.process(child, &child_ctx)?);
                visited.insert(child.location.clone());
            }
        }
        process_descendants(processor, child, ctx, visited, result)?;
    }
    Ok(())
}

fn mark_subtree(node: &Node, visited: &mut HashSet<String>) {
    node.walk(&mut |_, n| {
        visited.insert(n.location.clone());
    });
}

fn clear_unvisited(node: &mut Node, visited: &HashSet<String>) {
    if visited.contains(&node.location) {
        return;
    }
    node.value = None;
    for child in &mut node.children {
        if !child.is_resource() {
            clear_unvisited(child, visited);
        }
    }
}

/// Nested resources reachable from `root` without crossing another resource
fn nested_resource_paths(root: &Node) -> Vec<NodePath> {
    fn collect(node: &Node, path: &mut NodePath, out: &mut Vec<NodePath>) {
        for (idx, child) in node.children.iter().enumerate() {
            path.push(idx);
            if child.is_resource() {
                out.push(path.clone());
            } else {
                collect(child, path, out);
            }
            path.pop();
        }
    }
    let mut out = Vec::new();
    collect(root, &mut Vec::new(), &mut out);
    out
}

/// Empties a resource, keeping only its type marker
pub fn make_placeholder(resource: &mut Node) {
    resource.value = None;
    resource.children.clear();
}

fn expression_error(resource: &Node, err: crate::deid::expression::ExpressionError) -> ProcessingError {
    ProcessingError::Expression {
        location: resource.location.clone(),
        message: err.to_string(),
    }
}

fn unknown_tag(node: &Node, tag: Tag) -> ProcessingError {
    ProcessingError::UnknownTag {
        location: node.location.clone(),
        tag: tag.to_string(),
    }
}
