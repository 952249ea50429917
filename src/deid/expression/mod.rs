//! Selector and predicate expressions
//!
//! One small path language serves both rule selectors (`Patient.name.where(use =
//! 'official')`, `nodesByType('Address')`) and the predicate/replacement expressions of
//! `generalize` cases (`$this >= 18 and $this < 65`). Expressions are compiled once at
//! configuration load; compile failures are configuration errors.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::Item;
pub use parser::{Expr, Function};
pub use value::Value;

use crate::domain::{Node, NodePath};
use thiserror::Error;

/// Compile or evaluation failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}{}", offset_suffix(.position))]
pub struct ExpressionError {
    pub message: String,
    /// Character offset into the source, for compile errors
    pub position: Option<usize>,
}

fn offset_suffix(position: &Option<usize>) -> String {
    position.map(|pos| format!(" (at offset {pos})")).unwrap_or_default()
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(position: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

/// A parsed expression together with its source text
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    expr: Expr,
}

impl CompiledExpression {
    /// Parses and validates expression text
    pub fn compile(source: impl Into<String>) -> Result<Self, ExpressionError> {
        let source = source.into();
        let expr = parser::parse(&source)?;
        Ok(Self { source, expr })
    }

    pub(crate) fn from_parts(source: String, expr: Expr) -> Self {
        Self { source, expr }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Nodes selected from `root`, as index paths relative to `root`
    pub fn select(&self, root: &Node) -> Result<Vec<NodePath>, ExpressionError> {
        let focus = [Item::Node(root, Vec::new())];
        self.select_from(&focus)
    }

    /// Nodes selected when evaluating against an explicit focus collection
    pub fn select_from(&self, focus: &[Item<'_>]) -> Result<Vec<NodePath>, ExpressionError> {
        let result = eval::evaluate(&self.expr, focus, focus.first())?;
        let mut seen = std::collections::HashSet::new();
        Ok(result
            .into_iter()
            .filter_map(|item| match item {
                Item::Node(_, path) => Some(path),
                Item::Value(_) => None,
            })
            .filter(|path| seen.insert(path.clone()))
            .collect())
    }

    /// Evaluates the expression as a predicate with `node` as focus and `$this`
    pub fn test(&self, node: &Node) -> Result<bool, ExpressionError> {
        let item = Item::Node(node, Vec::new());
        eval::is_true(&self.expr, std::slice::from_ref(&item), Some(&item))
    }

    /// Evaluates the expression to a single scalar with `node` as focus and `$this`
    pub fn value_of(&self, node: &Node) -> Result<Option<Value>, ExpressionError> {
        let item = Item::Node(node, Vec::new());
        let result = eval::evaluate(&self.expr, std::slice::from_ref(&item), Some(&item))?;
        match result.as_slice() {
            [] => Ok(None),
            [single] => Ok(single.value()),
            many => Err(ExpressionError::new(format!(
                "expected a single value, found {} items",
                many.len()
            ))),
        }
    }
}
