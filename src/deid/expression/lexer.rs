//! Tokenizer for selector and predicate expressions

use super::ExpressionError;

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Decimal(f64),
    String(String),
    /// `@`-prefixed date literal, without the `@`
    Date(String),
    Identifier(String),
    /// `$this`
    This,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    NotEq,
    Equiv,
    NotEquiv,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
}

/// Splits expression text into tokens
pub fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let token = match c {
            '.' => {
                pos += 1;
                Token::Dot
            }
            ',' => {
                pos += 1;
                Token::Comma
            }
            '(' => {
                pos += 1;
                Token::LParen
            }
            ')' => {
                pos += 1;
                Token::RParen
            }
            '[' => {
                pos += 1;
                Token::LBracket
            }
            ']' => {
                pos += 1;
                Token::RBracket
            }
            '+' => {
                pos += 1;
                Token::Plus
            }
            '-' => {
                pos += 1;
                Token::Minus
            }
            '*' => {
                pos += 1;
                Token::Star
            }
            '/' => {
                pos += 1;
                Token::Slash
            }
            '&' => {
                pos += 1;
                Token::Amp
            }
            '|' => {
                pos += 1;
                Token::Pipe
            }
            '=' => {
                pos += 1;
                Token::Eq
            }
            '~' => {
                pos += 1;
                Token::Equiv
            }
            '!' => match chars.get(pos + 1) {
                Some('=') => {
                    pos += 2;
                    Token::NotEq
                }
                Some('~') => {
                    pos += 2;
                    Token::NotEquiv
                }
                _ => return Err(ExpressionError::at(start, "expected '=' or '~' after '!'")),
            },
            '<' => {
                if chars.get(pos + 1) == Some(&'=') {
                    pos += 2;
                    Token::LtEq
                } else {
                    pos += 1;
                    Token::Lt
                }
            }
            '>' => {
                if chars.get(pos + 1) == Some(&'=') {
                    pos += 2;
                    Token::GtEq
                } else {
                    pos += 1;
                    Token::Gt
                }
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, pos, '\'')?;
                pos = next;
                Token::String(text)
            }
            '`' => {
                let (text, next) = read_quoted(&chars, pos, '`')?;
                pos = next;
                Token::Identifier(text)
            }
            '@' => {
                pos += 1;
                let begin = pos;
                while pos < chars.len()
                    && (chars[pos].is_ascii_alphanumeric() || matches!(chars[pos], '-' | ':' | '.' | '+'))
                {
                    pos += 1;
                }
                if begin == pos {
                    return Err(ExpressionError::at(start, "empty date literal"));
                }
                Token::Date(chars[begin..pos].iter().collect())
            }
            '$' => {
                pos += 1;
                let begin = pos;
                while pos < chars.len() && chars[pos].is_ascii_alphanumeric() {
                    pos += 1;
                }
                let name: String = chars[begin..pos].iter().collect();
                if name != "this" {
                    return Err(ExpressionError::at(start, format!("unknown variable '${name}'")));
                }
                Token::This
            }
            c if c.is_ascii_digit() => {
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let is_decimal = chars.get(pos) == Some(&'.')
                    && chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit());
                if is_decimal {
                    pos += 1;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                let text: String = chars[start..pos].iter().collect();
                if is_decimal {
                    Token::Decimal(
                        text.parse()
                            .map_err(|_| ExpressionError::at(start, "invalid decimal literal"))?,
                    )
                } else {
                    Token::Integer(
                        text.parse()
                            .map_err(|_| ExpressionError::at(start, "integer literal out of range"))?,
                    )
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                Token::Identifier(chars[start..pos].iter().collect())
            }
            other => {
                return Err(ExpressionError::at(start, format!("unexpected character '{other}'")))
            }
        };
        tokens.push((start, token));
    }

    Ok(tokens)
}

fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), ExpressionError> {
    let mut pos = start + 1;
    let mut text = String::new();
    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| ExpressionError::at(pos, "dangling escape"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                pos += 2;
            }
            c if c == quote => return Ok((text, pos + 1)),
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }
    Err(ExpressionError::at(start, "unterminated literal"))
}
