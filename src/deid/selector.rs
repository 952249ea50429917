//! Compiled path selectors
//!
//! A selector is an expression plus two things derived from it at load time: the root
//! type it is qualified with (if any) and, when the expression starts with
//! `nodesByType(..)` or `nodesByName(..)`, an index anchor so the matcher can start
//! from a per-resource lookup instead of scanning the tree.

use crate::deid::expression::{CompiledExpression, Expr, ExpressionError, Function, Value};

/// Index key a selector can start from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Type(String),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct Selector {
    expression: CompiledExpression,
    root_type: Option<String>,
    anchored: Option<(Anchor, CompiledExpression)>,
}

impl Selector {
    /// Compiles a path selector
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let expression = CompiledExpression::compile(source)?;
        Ok(Self::from_expression(expression))
    }

    /// Selector matching every node of the given semantic type
    pub fn for_type(type_name: &str) -> Result<Self, ExpressionError> {
        if type_name.is_empty() || !type_name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ExpressionError::new(format!("invalid type name '{type_name}'")));
        }
        Self::compile(&format!("nodesByType('{type_name}')"))
    }

    fn from_expression(expression: CompiledExpression) -> Self {
        let root_type = match leftmost(expression.expr()) {
            Expr::Identifier(name)
                if name.starts_with(|c: char| c.is_ascii_uppercase())
                    && name != "Resource"
                    && name != "DomainResource" =>
            {
                Some(name.clone())
            }
            _ => None,
        };
        let anchored = split_anchor(expression.expr()).map(|(anchor, rest)| {
            (
                anchor,
                CompiledExpression::from_parts(expression.source().to_string(), rest),
            )
        });
        Self {
            expression,
            root_type,
            anchored,
        }
    }

    pub fn source(&self) -> &str {
        self.expression.source()
    }

    pub fn expression(&self) -> &CompiledExpression {
        &self.expression
    }

    /// Root type the selector is qualified with; `None` means any root
    pub fn root_type(&self) -> Option<&str> {
        self.root_type.as_deref()
    }

    /// Index anchor and the remaining chain, which starts from `Expr::Focus`
    pub fn anchored(&self) -> Option<&(Anchor, CompiledExpression)> {
        self.anchored.as_ref()
    }

    /// Whether the selector can match inside a resource of this type
    pub fn accepts_root(&self, resource_type: &str) -> bool {
        self.root_type.as_deref().map_or(true, |t| t == resource_type)
    }
}

fn leftmost(expr: &Expr) -> &Expr {
    match expr {
        Expr::Member(target, _) | Expr::Index(target, _) => leftmost(target),
        Expr::Call {
            target: Some(target),
            ..
        } => leftmost(target),
        other => other,
    }
}

/// Replaces a leading `nodesByType`/`nodesByName` call with `Expr::Focus`
fn split_anchor(expr: &Expr) -> Option<(Anchor, Expr)> {
    match expr {
        Expr::Call {
            target: None,
            function,
            args,
        } if matches!(function, Function::NodesByType | Function::NodesByName) => {
            let Some(Expr::Literal(Value::String(name))) = args.first() else {
                return None;
            };
            let anchor = match function {
                Function::NodesByType => Anchor::Type(name.clone()),
                _ => Anchor::Name(name.clone()),
            };
            Some((anchor, Expr::Focus))
        }
        Expr::Member(target, name) => {
            let (anchor, rest) = split_anchor(target)?;
            Some((anchor, Expr::Member(Box::new(rest), name.clone())))
        }
        Expr::Index(target, index) => {
            let (anchor, rest) = split_anchor(target)?;
            Some((anchor, Expr::Index(Box::new(rest), index.clone())))
        }
        Expr::Call {
            target: Some(target),
            function,
            args,
        } => {
            let (anchor, rest) = split_anchor(target)?;
            Some((
                anchor,
                Expr::Call {
                    target: Some(Box::new(rest)),
                    function: *function,
                    args: args.clone(),
                },
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_type_detection() {
        assert_eq!(Selector::compile("Patient.address").unwrap().root_type(), Some("Patient"));
        assert_eq!(Selector::compile("Resource.id").unwrap().root_type(), None);
        assert_eq!(Selector::compile("name.family").unwrap().root_type(), None);

        let selector = Selector::compile("Patient.name").unwrap();
        assert!(selector.accepts_root("Patient"));
        assert!(!selector.accepts_root("Observation"));
    }

    #[test]
    fn test_type_selector_is_anchored() {
        let selector = Selector::for_type("Address").unwrap();
        let (anchor, rest) = selector.anchored().unwrap();
        assert_eq!(anchor, &Anchor::Type("Address".to_string()));
        assert_eq!(rest.expr(), &Expr::Focus);
    }

    #[test]
    fn test_anchor_keeps_remaining_chain() {
        let selector = Selector::compile("nodesByName('period').start").unwrap();
        let (anchor, rest) = selector.anchored().unwrap();
        assert_eq!(anchor, &Anchor::Name("period".to_string()));
        assert_eq!(rest.expr(), &Expr::Member(Box::new(Expr::Focus), "start".to_string()));
    }

    #[test]
    fn test_invalid_type_name() {
        assert!(Selector::for_type("Address')").is_err());
        assert!(Selector::for_type("").is_err());
    }

    #[test]
    fn test_unanchored_selectors() {
        assert!(Selector::compile("Patient.nodesByType('HumanName')").unwrap().anchored().is_none());
    }
}
