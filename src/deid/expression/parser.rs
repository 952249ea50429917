//! Recursive-descent parser producing [`Expr`] trees
//!
//! Precedence, loosest first: `implies`, `or`/`xor`, `and`, equality, comparison,
//! `|`, additive (`+ - &`), multiplicative (`* / div mod`), unary, invocation.

use super::lexer::{tokenize, Token};
use super::value::Value;
use super::ExpressionError;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Implies,
    Or,
    Xor,
    And,
    Eq,
    NotEq,
    Equiv,
    NotEquiv,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Union,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    IntDiv,
    Mod,
}

/// Functions known to the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Where,
    NodesByType,
    NodesByName,
    Descendants,
    Children,
    Exists,
    Empty,
    Not,
    Count,
    First,
    Last,
    StartsWith,
    EndsWith,
    Contains,
    Matches,
    Replace,
    ReplaceMatches,
    Substring,
    Length,
    Upper,
    Lower,
    ToString,
    ToInteger,
    ToDecimal,
    Round,
    Floor,
    Ceiling,
    Abs,
}

impl Function {
    fn lookup(name: &str) -> Option<(Self, usize, usize)> {
        // (function, min args, max args)
        Some(match name {
            "where" => (Self::Where, 1, 1),
            "nodesByType" => (Self::NodesByType, 1, 1),
            "nodesByName" => (Self::NodesByName, 1, 1),
            "descendants" => (Self::Descendants, 0, 0),
            "children" => (Self::Children, 0, 0),
            "exists" => (Self::Exists, 0, 1),
            "empty" => (Self::Empty, 0, 0),
            "not" => (Self::Not, 0, 0),
            "count" => (Self::Count, 0, 0),
            "first" => (Self::First, 0, 0),
            "last" => (Self::Last, 0, 0),
            "startsWith" => (Self::StartsWith, 1, 1),
            "endsWith" => (Self::EndsWith, 1, 1),
            "contains" => (Self::Contains, 1, 1),
            "matches" => (Self::Matches, 1, 1),
            "replace" => (Self::Replace, 2, 2),
            "replaceMatches" => (Self::ReplaceMatches, 2, 2),
            "substring" => (Self::Substring, 1, 2),
            "length" => (Self::Length, 0, 0),
            "upper" => (Self::Upper, 0, 0),
            "lower" => (Self::Lower, 0, 0),
            "toString" => (Self::ToString, 0, 0),
            "toInteger" => (Self::ToInteger, 0, 0),
            "toDecimal" => (Self::ToDecimal, 0, 0),
            "round" => (Self::Round, 0, 1),
            "floor" => (Self::Floor, 0, 0),
            "ceiling" => (Self::Ceiling, 0, 0),
            "abs" => (Self::Abs, 0, 0),
            _ => return None,
        })
    }
}

/// Expression syntax tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    This,
    /// The input collection itself. Never produced by the parser; used when a
    /// selector chain is re-anchored on pre-computed nodes.
    Focus,
    /// Leading identifier: a type qualifier or a child name of the focus
    Identifier(String),
    /// `target.name`
    Member(Box<Expr>, String),
    /// `target.fn(args)` or `fn(args)` on the focus
    Call {
        target: Option<Box<Expr>>,
        function: Function,
        args: Vec<Expr>,
    },
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Parses expression text
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::new("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.expression(0)?;
    if let Some((offset, token)) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::at(*offset, format!("unexpected token {token:?}")));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::Identifier(word) => match word.as_str() {
            "implies" => (BinaryOp::Implies, 1),
            "or" => (BinaryOp::Or, 2),
            "xor" => (BinaryOp::Xor, 2),
            "and" => (BinaryOp::And, 3),
            "div" => (BinaryOp::IntDiv, 8),
            "mod" => (BinaryOp::Mod, 8),
            _ => return None,
        },
        Token::Eq => (BinaryOp::Eq, 4),
        Token::NotEq => (BinaryOp::NotEq, 4),
        Token::Equiv => (BinaryOp::Equiv, 4),
        Token::NotEquiv => (BinaryOp::NotEquiv, 4),
        Token::Lt => (BinaryOp::Lt, 5),
        Token::LtEq => (BinaryOp::LtEq, 5),
        Token::Gt => (BinaryOp::Gt, 5),
        Token::GtEq => (BinaryOp::GtEq, 5),
        Token::Pipe => (BinaryOp::Union, 6),
        Token::Plus => (BinaryOp::Add, 7),
        Token::Minus => (BinaryOp::Sub, 7),
        Token::Amp => (BinaryOp::Concat, 7),
        Token::Star => (BinaryOp::Mul, 8),
        Token::Slash => (BinaryOp::Div, 8),
        _ => return None,
    })
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(ExpressionError::at(offset, format!("expected {expected:?}, found {t:?}"))),
            None => Err(ExpressionError::at(offset, format!("expected {expected:?}"))),
        }
    }

    fn expression(&mut self, min_prec: u8) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        while let Some((op, prec)) = self.peek().and_then(binary_op) {
            if prec < min_prec.max(1) {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(prec + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.invocation(),
        }
    }

    fn invocation(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let offset = self.offset();
                    let name = match self.next() {
                        Some(Token::Identifier(name)) => name,
                        _ => return Err(ExpressionError::at(offset, "expected a name after '.'")),
                    };
                    expr = if self.peek() == Some(&Token::LParen) {
                        let (function, args) = self.call(&name, offset)?;
                        Expr::Call {
                            target: Some(Box::new(expr)),
                            function,
                            args,
                        }
                    } else {
                        Expr::Member(Box::new(expr), name)
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression(0)?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<(Function, Vec<Expr>), ExpressionError> {
        let (function, min, max) = Function::lookup(name)
            .ok_or_else(|| ExpressionError::at(offset, format!("unknown function '{name}'")))?;
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expression(0)?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        if args.len() < min || args.len() > max {
            return Err(ExpressionError::at(
                offset,
                format!("function '{name}' takes {min}..={max} arguments, got {}", args.len()),
            ));
        }
        Ok((function, args))
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Integer(i)) => Ok(Expr::Literal(Value::Integer(i))),
            Some(Token::Decimal(d)) => Ok(Expr::Literal(Value::Decimal(d))),
            Some(Token::String(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Date(text)) => Value::date(&text)
                .map(Expr::Literal)
                .ok_or_else(|| ExpressionError::at(offset, format!("invalid date literal '@{text}'"))),
            Some(Token::This) => Ok(Expr::This),
            Some(Token::LParen) => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Identifier(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ if self.peek() == Some(&Token::LParen) => {
                    let (function, args) = self.call(&word, offset)?;
                    Ok(Expr::Call {
                        target: None,
                        function,
                        args,
                    })
                }
                _ => Ok(Expr::Identifier(word)),
            },
            Some(t) => Err(ExpressionError::at(offset, format!("unexpected token {t:?}"))),
            None => Err(ExpressionError::at(offset, "unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_chain() {
        let expr = parse("Patient.name.family").unwrap();
        assert_eq!(
            expr,
            Expr::Member(
                Box::new(Expr::Member(
                    Box::new(Expr::Identifier("Patient".into())),
                    "name".into()
                )),
                "family".into()
            )
        );
    }

    #[test]
    fn test_precedence() {
        // and binds tighter than or, comparison tighter than and
        let expr = parse("a = 1 or b > 2 and c < 3").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Or, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::And, _, _)));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_left_associative() {
        let expr = parse("10 - 4 - 3").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Sub, lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Binary(BinaryOp::Sub, _, _)));
                assert_eq!(*rhs, Expr::Literal(Value::Integer(3)));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn test_function_calls() {
        let expr = parse("nodesByType('HumanName').where(use = 'official')").unwrap();
        assert!(matches!(
            expr,
            Expr::Call {
                function: Function::Where,
                target: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_errors() {
        assert!(parse("").is_err());
        assert!(parse("name.").is_err());
        assert!(parse("frobnicate()").is_err());
        assert!(parse("where()").is_err());
        assert!(parse("(a = 1").is_err());
        assert!(parse("a = 1)").is_err());
        assert!(parse("@2020-13-01").is_err());
    }
}
