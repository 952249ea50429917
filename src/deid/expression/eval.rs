//! Evaluation of compiled expressions over a resource subtree
//!
//! Collections hold either tree nodes (with their index path relative to the resource
//! root being evaluated) or plain values. Member access never steps inside a nested
//! resource: those are separate traversal frames.

use super::parser::{BinaryOp, Expr, Function};
use super::value::Value;
use super::ExpressionError;
use crate::domain::{Node, NodePath};
use regex::Regex;
use std::cmp::Ordering;

/// An element of an evaluation collection
#[derive(Debug, Clone)]
pub enum Item<'a> {
    Node(&'a Node, NodePath),
    Value(Value),
}

impl<'a> Item<'a> {
    /// Typed scalar view of the item
    pub fn value(&self) -> Option<Value> {
        match self {
            Item::Node(node, _) => Value::from_node(node),
            Item::Value(v) => Some(v.clone()),
        }
    }

    /// Index path for node items
    pub fn path(&self) -> Option<&NodePath> {
        match self {
            Item::Node(_, path) => Some(path),
            Item::Value(_) => None,
        }
    }
}

type Collection<'a> = Vec<Item<'a>>;
type EvalResult<'a> = Result<Collection<'a>, ExpressionError>;

/// Whether `child` answers to the member name `name`
///
/// Choice-typed fields match by prefix when the suffix names the child's type, so
/// `value` matches a `valueQuantity` child of type `Quantity`.
pub fn name_matches(child: &Node, name: &str) -> bool {
    if child.name == name {
        return true;
    }
    match child.name.strip_prefix(name) {
        Some(suffix) if suffix.starts_with(|c: char| c.is_ascii_uppercase()) => {
            suffix.eq_ignore_ascii_case(&child.instance_type)
        }
        _ => false,
    }
}

fn is_opaque(node: &Node, path: &NodePath) -> bool {
    node.is_resource() && !path.is_empty()
}

fn is_type_qualifier(node: &Node, name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
        && (node.instance_type == name
            || (node.is_resource() && (name == "Resource" || name == "DomainResource")))
}

fn push_members<'a>(node: &'a Node, path: &NodePath, name: &str, out: &mut Collection<'a>) {
    if is_opaque(node, path) {
        return;
    }
    for (idx, child) in node.children.iter().enumerate() {
        if name_matches(child, name) {
            let mut child_path = path.clone();
            child_path.push(idx);
            out.push(Item::Node(child, child_path));
        }
    }
}

/// Every descendant of `node`, in document order, without entering nested resources
pub fn push_descendants<'a>(node: &'a Node, path: &NodePath, out: &mut Collection<'a>) {
    if is_opaque(node, path) {
        return;
    }
    for (idx, child) in node.children.iter().enumerate() {
        if child.is_resource() {
            continue;
        }
        let mut child_path = path.clone();
        child_path.push(idx);
        out.push(Item::Node(child, child_path.clone()));
        push_descendants(child, &child_path, out);
    }
}

/// Evaluates `expr` against `focus`, with `this` bound to `$this`
pub fn evaluate<'a>(expr: &Expr, focus: &[Item<'a>], this: Option<&Item<'a>>) -> EvalResult<'a> {
    match expr {
        Expr::Literal(v) => Ok(vec![Item::Value(v.clone())]),
        Expr::This => Ok(this.cloned().into_iter().collect()),
        Expr::Focus => Ok(focus.to_vec()),
        Expr::Identifier(name) => {
            let mut out = Vec::new();
            for item in focus {
                if let Item::Node(node, path) = item {
                    if is_type_qualifier(node, name) {
                        out.push(item.clone());
                    } else {
                        push_members(node, path, name, &mut out);
                    }
                }
            }
            Ok(out)
        }
        Expr::Member(target, name) => {
            let input = evaluate(target, focus, this)?;
            let mut out = Vec::new();
            for item in &input {
                if let Item::Node(node, path) = item {
                    push_members(node, path, name, &mut out);
                }
            }
            Ok(out)
        }
        Expr::Index(target, index) => {
            let input = evaluate(target, focus, this)?;
            let index = evaluate(index, focus, this)?;
            match singleton(&index)? {
                Some(Value::Integer(i)) if i >= 0 => {
                    Ok(input.into_iter().nth(i as usize).into_iter().collect())
                }
                Some(other) => Err(ExpressionError::new(format!(
                    "index must be a non-negative integer, got {other}"
                ))),
                None => Ok(Vec::new()),
            }
        }
        Expr::Negate(inner) => {
            let input = evaluate(inner, focus, this)?;
            Ok(match singleton(&input)? {
                Some(Value::Integer(i)) => vec![Item::Value(Value::Integer(-i))],
                Some(Value::Decimal(d)) => vec![Item::Value(Value::Decimal(-d))],
                Some(other) => {
                    return Err(ExpressionError::new(format!(
                        "cannot negate a {}",
                        other.type_name()
                    )))
                }
                None => Vec::new(),
            })
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, focus, this),
        Expr::Call {
            target,
            function,
            args,
        } => {
            let input = match target {
                Some(target) => evaluate(target, focus, this)?,
                None => focus.to_vec(),
            };
            call(*function, input, args, focus, this)
        }
    }
}

/// Evaluates a predicate; an empty result counts as false
pub fn is_true<'a>(expr: &Expr, focus: &[Item<'a>], this: Option<&Item<'a>>) -> Result<bool, ExpressionError> {
    let result = evaluate(expr, focus, this)?;
    Ok(truthiness(&result)?.unwrap_or(false))
}

fn singleton(input: &[Item<'_>]) -> Result<Option<Value>, ExpressionError> {
    match input {
        [] => Ok(None),
        [item] => Ok(item.value()),
        _ => Err(ExpressionError::new(format!(
            "expected a single value, found {} items",
            input.len()
        ))),
    }
}

fn truthiness(input: &[Item<'_>]) -> Result<Option<bool>, ExpressionError> {
    match input {
        [] => Ok(None),
        [item] => Ok(Some(match item.value() {
            Some(Value::Bool(b)) => b,
            _ => true,
        })),
        _ => Err(ExpressionError::new(format!(
            "expected a single boolean, found {} items",
            input.len()
        ))),
    }
}

fn boolean<'a>(b: Option<bool>) -> Collection<'a> {
    b.map(|b| vec![Item::Value(Value::Bool(b))]).unwrap_or_default()
}

fn binary<'a>(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    focus: &[Item<'a>],
    this: Option<&Item<'a>>,
) -> EvalResult<'a> {
    let left = evaluate(lhs, focus, this)?;
    let right = evaluate(rhs, focus, this)?;

    match op {
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Implies => {
            let l = truthiness(&left)?;
            let r = truthiness(&right)?;
            Ok(boolean(match op {
                BinaryOp::And => match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
                BinaryOp::Or => match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
                BinaryOp::Xor => l.zip(r).map(|(a, b)| a != b),
                _ => match (l, r) {
                    (Some(false), _) | (_, Some(true)) => Some(true),
                    (Some(true), r) => r,
                    (None, _) => None,
                },
            }))
        }
        BinaryOp::Union => {
            let mut out = left;
            out.extend(right);
            Ok(out)
        }
        BinaryOp::Concat => {
            let l = singleton(&left)?.map(|v| v.to_string()).unwrap_or_default();
            let r = singleton(&right)?.map(|v| v.to_string()).unwrap_or_default();
            Ok(vec![Item::Value(Value::String(l + &r))])
        }
        _ => {
            let (Some(l), Some(r)) = (singleton(&left)?, singleton(&right)?) else {
                return Ok(Vec::new());
            };
            let value = match op {
                BinaryOp::Eq => Value::Bool(l.equals(&r)),
                BinaryOp::NotEq => Value::Bool(!l.equals(&r)),
                BinaryOp::Equiv => Value::Bool(l.equivalent(&r)),
                BinaryOp::NotEquiv => Value::Bool(!l.equivalent(&r)),
                BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                    let ord = l.compare(&r).ok_or_else(|| {
                        ExpressionError::new(format!(
                            "cannot compare {} with {}",
                            l.type_name(),
                            r.type_name()
                        ))
                    })?;
                    Value::Bool(match op {
                        BinaryOp::Lt => ord == Ordering::Less,
                        BinaryOp::LtEq => ord != Ordering::Greater,
                        BinaryOp::Gt => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    })
                }
                _ => match arithmetic(op, &l, &r)? {
                    Some(v) => v,
                    None => return Ok(Vec::new()),
                },
            };
            Ok(vec![Item::Value(value)])
        }
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Option<Value>, ExpressionError> {
    let mismatch = || {
        ExpressionError::new(format!(
            "operator {op:?} not defined for {} and {}",
            l.type_name(),
            r.type_name()
        ))
    };
    if let (BinaryOp::Add, Value::String(a), Value::String(b)) = (op, l, r) {
        return Ok(Some(Value::String(format!("{a}{b}"))));
    }
    if let (Value::Integer(a), Value::Integer(b)) = (l, r) {
        return Ok(match op {
            BinaryOp::Add => a.checked_add(*b).map(Value::Integer),
            BinaryOp::Sub => a.checked_sub(*b).map(Value::Integer),
            BinaryOp::Mul => a.checked_mul(*b).map(Value::Integer),
            BinaryOp::Div => (*b != 0).then(|| Value::Decimal(*a as f64 / *b as f64)),
            BinaryOp::IntDiv => a.checked_div(*b).map(Value::Integer),
            BinaryOp::Mod => a.checked_rem(*b).map(Value::Integer),
            _ => return Err(mismatch()),
        });
    }
    let (a, b) = (l.as_f64().ok_or_else(mismatch)?, r.as_f64().ok_or_else(mismatch)?);
    Ok(match op {
        BinaryOp::Add => Some(Value::Decimal(a + b)),
        BinaryOp::Sub => Some(Value::Decimal(a - b)),
        BinaryOp::Mul => Some(Value::Decimal(a * b)),
        BinaryOp::Div => (b != 0.0).then(|| Value::Decimal(a / b)),
        BinaryOp::IntDiv => (b != 0.0).then(|| Value::Integer((a / b).trunc() as i64)),
        BinaryOp::Mod => (b != 0.0).then(|| Value::Decimal(a % b)),
        _ => return Err(mismatch()),
    })
}

fn string_arg<'a>(
    args: &[Expr],
    idx: usize,
    focus: &[Item<'a>],
    this: Option<&Item<'a>>,
) -> Result<Option<String>, ExpressionError> {
    match args.get(idx) {
        Some(expr) => Ok(singleton(&evaluate(expr, focus, this)?)?.map(|v| v.to_string())),
        None => Ok(None),
    }
}

fn integer_arg<'a>(
    args: &[Expr],
    idx: usize,
    focus: &[Item<'a>],
    this: Option<&Item<'a>>,
) -> Result<Option<i64>, ExpressionError> {
    match args.get(idx) {
        Some(expr) => match singleton(&evaluate(expr, focus, this)?)? {
            Some(Value::Integer(i)) => Ok(Some(i)),
            Some(other) => Err(ExpressionError::new(format!(
                "expected an integer argument, got {}",
                other.type_name()
            ))),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

fn call<'a>(
    function: Function,
    input: Collection<'a>,
    args: &[Expr],
    focus: &[Item<'a>],
    this: Option<&Item<'a>>,
) -> EvalResult<'a> {
    match function {
        Function::Where => {
            let mut out = Vec::new();
            for item in input {
                let scope = [item.clone()];
                if is_true(&args[0], &scope, Some(&item))? {
                    out.push(item);
                }
            }
            Ok(out)
        }
        Function::NodesByType | Function::NodesByName => {
            let wanted = string_arg(args, 0, focus, this)?
                .ok_or_else(|| ExpressionError::new("node filter needs a name"))?;
            let mut all = Vec::new();
            for item in &input {
                if let Item::Node(node, path) = item {
                    push_descendants(node, path, &mut all);
                }
            }
            Ok(all
                .into_iter()
                .filter(|item| match item {
                    Item::Node(node, _) if function == Function::NodesByType => {
                        node.instance_type == wanted
                    }
                    Item::Node(node, _) => node.name == wanted,
                    Item::Value(_) => false,
                })
                .collect())
        }
        Function::Descendants => {
            let mut out = Vec::new();
            for item in &input {
                if let Item::Node(node, path) = item {
                    push_descendants(node, path, &mut out);
                }
            }
            Ok(out)
        }
        Function::Children => {
            let mut out = Vec::new();
            for item in &input {
                if let Item::Node(node, path) = item {
                    if !is_opaque(node, path) {
                        for (idx, child) in node.children.iter().enumerate() {
                            let mut child_path = path.clone();
                            child_path.push(idx);
                            out.push(Item::Node(child, child_path));
                        }
                    }
                }
            }
            Ok(out)
        }
        Function::Exists => {
            let found = match args.first() {
                Some(criteria) => {
                    let mut any = false;
                    for item in &input {
                        if is_true(criteria, std::slice::from_ref(item), Some(item))? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                None => !input.is_empty(),
            };
            Ok(boolean(Some(found)))
        }
        Function::Empty => Ok(boolean(Some(input.is_empty()))),
        Function::Count => Ok(vec![Item::Value(Value::Integer(input.len() as i64))]),
        Function::First => Ok(input.into_iter().next().into_iter().collect()),
        Function::Last => Ok(input.into_iter().last().into_iter().collect()),
        Function::Not => Ok(boolean(truthiness(&input)?.map(|b| !b))),
        _ => scalar_call(function, singleton(&input)?, args, focus, this),
    }
}

fn scalar_call<'a>(
    function: Function,
    input: Option<Value>,
    args: &[Expr],
    focus: &[Item<'a>],
    this: Option<&Item<'a>>,
) -> EvalResult<'a> {
    let Some(value) = input else {
        return Ok(Vec::new());
    };
    let text = value.to_string();
    let out = match function {
        Function::StartsWith | Function::EndsWith | Function::Contains => {
            let Some(arg) = string_arg(args, 0, focus, this)? else {
                return Ok(Vec::new());
            };
            Value::Bool(match function {
                Function::StartsWith => text.starts_with(&arg),
                Function::EndsWith => text.ends_with(&arg),
                _ => text.contains(&arg),
            })
        }
        Function::Matches => {
            let Some(pattern) = string_arg(args, 0, focus, this)? else {
                return Ok(Vec::new());
            };
            Value::Bool(compile_regex(&pattern)?.is_match(&text))
        }
        Function::Replace => {
            let (Some(from), Some(to)) =
                (string_arg(args, 0, focus, this)?, string_arg(args, 1, focus, this)?)
            else {
                return Ok(Vec::new());
            };
            Value::String(text.replace(&from, &to))
        }
        Function::ReplaceMatches => {
            let (Some(pattern), Some(to)) =
                (string_arg(args, 0, focus, this)?, string_arg(args, 1, focus, this)?)
            else {
                return Ok(Vec::new());
            };
            Value::String(compile_regex(&pattern)?.replace_all(&text, to.as_str()).into_owned())
        }
        Function::Substring => {
            let chars: Vec<char> = text.chars().collect();
            let start = integer_arg(args, 0, focus, this)?.unwrap_or(0);
            if start < 0 || start as usize >= chars.len() {
                return Ok(Vec::new());
            }
            let start = start as usize;
            let end = match integer_arg(args, 1, focus, this)? {
                Some(len) if len <= 0 => start,
                Some(len) => start.saturating_add(len as usize).min(chars.len()),
                None => chars.len(),
            };
            Value::String(chars[start..end].iter().collect())
        }
        Function::Length => Value::Integer(text.chars().count() as i64),
        Function::Upper => Value::String(text.to_uppercase()),
        Function::Lower => Value::String(text.to_lowercase()),
        Function::ToString => Value::String(text),
        Function::ToInteger => match value {
            Value::Integer(i) => Value::Integer(i),
            Value::Bool(b) => Value::Integer(b as i64),
            Value::String(s) => match s.trim().parse() {
                Ok(i) => Value::Integer(i),
                Err(_) => return Ok(Vec::new()),
            },
            _ => return Ok(Vec::new()),
        },
        Function::ToDecimal => match value {
            Value::Bool(b) => Value::Decimal(if b { 1.0 } else { 0.0 }),
            Value::String(s) => match s.trim().parse() {
                Ok(d) => Value::Decimal(d),
                Err(_) => return Ok(Vec::new()),
            },
            other => match other.as_f64() {
                Some(d) => Value::Decimal(d),
                None => return Ok(Vec::new()),
            },
        },
        Function::Round | Function::Floor | Function::Ceiling | Function::Abs => {
            if let (Function::Abs, Value::Integer(i)) = (function, &value) {
                return Ok(i.checked_abs().map(|i| Item::Value(Value::Integer(i))).into_iter().collect());
            }
            let n = value.as_f64().ok_or_else(|| {
                ExpressionError::new(format!("{function:?} needs a number, got {}", value.type_name()))
            })?;
            match function {
                Function::Round => {
                    let digits = integer_arg(args, 0, focus, this)?.unwrap_or(0).clamp(0, 15);
                    let factor = 10f64.powi(digits as i32);
                    Value::Decimal((n * factor).round() / factor)
                }
                Function::Floor => Value::Integer(n.floor() as i64),
                Function::Ceiling => Value::Integer(n.ceil() as i64),
                _ => Value::Decimal(n.abs()),
            }
        }
        other => {
            return Err(ExpressionError::new(format!(
                "{other:?} is not a scalar function"
            )))
        }
    };
    Ok(vec![Item::Value(out)])
}

fn compile_regex(pattern: &str) -> Result<Regex, ExpressionError> {
    Regex::new(pattern).map_err(|e| ExpressionError::new(format!("invalid regex '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn patient() -> Node {
        Node::resource("Patient", "Patient")
            .with_child(Node::leaf("id", "id", "p1"))
            .with_child(
                Node::element("name", "HumanName")
                    .with_child(Node::leaf("use", "code", "official"))
                    .with_child(Node::leaf("family", "string", "Chalmers")),
            )
            .with_child(
                Node::element("name", "HumanName")
                    .with_child(Node::leaf("use", "code", "maiden"))
                    .with_child(Node::leaf("family", "string", "Windsor")),
            )
            .with_child(Node::leaf("deceasedBoolean", "boolean", "false"))
            .with_child(
                Node::element("contained", "Organization")
                    .with_child(Node::leaf("name", "string", "Inner")),
            )
    }

    fn select<'a>(root: &'a Node, text: &str) -> Vec<String> {
        let expr = parse(text).unwrap();
        let focus = [Item::Node(root, Vec::new())];
        evaluate(&expr, &focus, focus.first())
            .unwrap()
            .iter()
            .filter_map(|item| match item {
                Item::Node(node, _) => Some(node.location.clone()),
                Item::Value(v) => Some(v.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_type_qualified_member() {
        let root = patient();
        assert_eq!(select(&root, "Patient.name.family").len(), 2);
        assert_eq!(select(&root, "name.family").len(), 2);
        assert!(select(&root, "Observation.code").is_empty());
        assert_eq!(select(&root, "DomainResource.id"), vec!["Patient.id[0]"]);
    }

    #[test]
    fn test_where_filter() {
        let root = patient();
        assert_eq!(
            select(&root, "Patient.name.where(use = 'official').family"),
            vec!["Patient.name[0].family[0]"]
        );
    }

    #[test]
    fn test_choice_type_member() {
        let root = patient();
        assert_eq!(select(&root, "Patient.deceased"), vec!["Patient.deceasedBoolean[0]"]);
    }

    #[test]
    fn test_nodes_by_type_and_name() {
        let root = patient();
        assert_eq!(select(&root, "nodesByType('HumanName')").len(), 2);
        assert_eq!(select(&root, "nodesByName('family')").len(), 2);
    }

    #[test]
    fn test_nested_resource_is_opaque() {
        let mut root = patient();
        root.children[4].kind = crate::domain::NodeKind::Resource;
        assert!(select(&root, "Patient.contained.name").is_empty());
        assert_eq!(select(&root, "Patient.contained").len(), 1);
        assert!(select(&root, "descendants()")
            .iter()
            .all(|loc| !loc.starts_with("Patient.contained")));
    }

    #[test]
    fn test_predicates_over_this() {
        let node = Node::leaf("age", "integer", "42");
        let item = Item::Node(&node, Vec::new());
        let focus = [item.clone()];
        let check = |text: &str| is_true(&parse(text).unwrap(), &focus, Some(&item)).unwrap();

        assert!(check("$this >= 18 and $this < 65"));
        assert!(!check("$this > 89"));
        assert!(check("$this div 10 = 4"));
        assert!(check("$this mod 10 = 2"));
        assert!(check("($this * 2).toString() = '84'"));
    }

    #[test]
    fn test_string_functions() {
        let root = Node::leaf("zip", "string", "98052-1234");
        let focus = [Item::Node(&root, Vec::new())];
        let eval = |text: &str| {
            evaluate(&parse(text).unwrap(), &focus, focus.first())
                .unwrap()
                .first()
                .and_then(Item::value)
                .map(|v| v.to_string())
        };

        assert_eq!(eval("$this.substring(0, 3)").as_deref(), Some("980"));
        assert_eq!(eval("$this.length()").as_deref(), Some("10"));
        assert_eq!(eval("$this.matches('^[0-9]{5}')").as_deref(), Some("true"));
        assert_eq!(
            eval("$this.replaceMatches('[0-9]', 'x')").as_deref(),
            Some("xxxxx-xxxx")
        );
        assert_eq!(eval("$this.startsWith('98') and $this.endsWith('34')").as_deref(), Some("true"));
        assert_eq!(eval("'a' & $this.missing & 'b'").as_deref(), Some("ab"));
    }

    #[test]
    fn test_integer_edges_do_not_overflow() {
        let root = Node::leaf("n", "integer", "-9223372036854775808");
        let focus = [Item::Node(&root, Vec::new())];
        let abs = evaluate(&parse("$this.abs()").unwrap(), &focus, focus.first()).unwrap();
        assert!(abs.is_empty());

        let text = Node::leaf("zip", "string", "98052");
        let focus = [Item::Node(&text, Vec::new())];
        let tail = evaluate(
            &parse("$this.substring(2, 9223372036854775807)").unwrap(),
            &focus,
            focus.first(),
        )
        .unwrap();
        assert_eq!(tail.first().and_then(Item::value).map(|v| v.to_string()).as_deref(), Some("052"));
    }

    #[test]
    fn test_empty_propagation() {
        let root = patient();
        let focus = [Item::Node(&root, Vec::new())];
        let expr = parse("Patient.birthDate > @2000-01-01").unwrap();
        assert!(!is_true(&expr, &focus, None).unwrap());
        assert!(evaluate(&expr, &focus, None).unwrap().is_empty());
    }

    #[test]
    fn test_runtime_type_error() {
        let node = Node::leaf("name", "string", "abc");
        let focus = [Item::Node(&node, Vec::new())];
        let expr = parse("$this < 20").unwrap();
        assert!(is_true(&expr, &focus, focus.first()).is_err());
    }
}
