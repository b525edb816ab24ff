//! Environment markers: the `; python_version >= "3.8"` suffix of a
//! dependency, deciding whether it applies to a given [`Environment`].

use std::fmt;
use std::str::FromStr;

use quarry_util::errors::ParseError;

use crate::environment::{Environment, VERSION_KEYS};
use crate::package::normalize;
use crate::specifier::parse_specifier;
use crate::version::parse_version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Compatible,
    ArbitraryEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Compatible => "~=",
            Self::ArbitraryEqual => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    /// The operator with its operands swapped, if one exists.
    fn flipped(self) -> Option<Self> {
        match self {
            Self::Equal | Self::NotEqual | Self::ArbitraryEqual => Some(self),
            Self::Less => Some(Self::Greater),
            Self::LessEqual => Some(Self::GreaterEqual),
            Self::Greater => Some(Self::Less),
            Self::GreaterEqual => Some(Self::LessEqual),
            Self::Compatible | Self::In | Self::NotIn => None,
        }
    }

    fn compare_str(self, lhs: &str, rhs: &str) -> bool {
        match self {
            Self::Equal | Self::ArbitraryEqual | Self::Compatible => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::Less => lhs < rhs,
            Self::LessEqual => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterEqual => lhs >= rhs,
            Self::In => rhs.contains(lhs),
            Self::NotIn => !rhs.contains(lhs),
        }
    }
}

impl fmt::Display for MarkerOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a marker comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

impl MarkerValue {
    fn resolve(&self, env: &Environment, extra: Option<&str>) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::Variable(name) if name == "extra" => extra.map(normalize).unwrap_or_default(),
            Self::Variable(name) => env.get(name).unwrap_or_default().to_string(),
        }
    }

    fn version_variable(&self) -> bool {
        matches!(self, Self::Variable(name) if VERSION_KEYS.contains(&name.as_str()))
    }

    fn is_extra(&self) -> bool {
        matches!(self, Self::Variable(name) if name == "extra")
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Literal(text) if text.contains('"') => write!(f, "'{text}'"),
            Self::Literal(text) => write!(f, "\"{text}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerExpression {
    pub lhs: MarkerValue,
    pub op: MarkerOperator,
    pub rhs: MarkerValue,
}

impl MarkerExpression {
    fn evaluate(&self, env: &Environment, extra: Option<&str>) -> bool {
        let lhs = self.lhs.resolve(env, extra);
        let rhs = self.rhs.resolve(env, extra);

        if self.lhs.is_extra() || self.rhs.is_extra() {
            return self.op.compare_str(&normalize(&lhs), &normalize(&rhs));
        }
        if self.lhs.version_variable() {
            if let Some(result) = compare_versions(&lhs, self.op, &rhs) {
                return result;
            }
        } else if self.rhs.version_variable() {
            if let Some(result) = self
                .op
                .flipped()
                .and_then(|op| compare_versions(&rhs, op, &lhs))
            {
                return result;
            }
        }
        self.op.compare_str(&lhs, &rhs)
    }
}

/// `version op bound` through the specifier machinery; `None` when the bound
/// is not a valid version for that operator.
fn compare_versions(version: &str, op: MarkerOperator, bound: &str) -> Option<bool> {
    if matches!(op, MarkerOperator::In | MarkerOperator::NotIn) {
        return None;
    }
    let specifier = parse_specifier(&format!("{}{bound}", op.as_str())).ok()?;
    Some(specifier.allows(&parse_version(version)))
}

impl fmt::Display for MarkerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// A boolean combination of marker expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    /// Evaluate against `env`, with `extra` bound to the extra currently
    /// being activated (or unbound for the base package).
    pub fn evaluate(&self, env: &Environment, extra: Option<&str>) -> bool {
        match self {
            Self::Expression(expr) => expr.evaluate(env, extra),
            Self::And(children) => children.iter().all(|c| c.evaluate(env, extra)),
            Self::Or(children) => children.iter().any(|c| c.evaluate(env, extra)),
        }
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(expr) => write!(f, "{expr}"),
            Self::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    match child {
                        Self::Or(_) => write!(f, "({child})")?,
                        _ => write!(f, "{child}")?,
                    }
                }
                Ok(())
            }
            Self::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for MarkerTree {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_marker(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Word(String),
    Quoted(String),
    Op(MarkerOperator),
}

#[derive(Debug)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let ch = bytes[pos];
        let start = pos;
        let token = match ch {
            b' ' | b'\t' | b'\n' | b'\r' => {
                pos += 1;
                continue;
            }
            b'(' => {
                pos += 1;
                Token::LParen
            }
            b')' => {
                pos += 1;
                Token::RParen
            }
            b'"' | b'\'' => {
                let close = source[pos + 1..].find(ch as char).ok_or_else(|| {
                    ParseError::new("unterminated string", source, start, source.len())
                })?;
                let text = source[pos + 1..pos + 1 + close].to_string();
                pos += close + 2;
                Token::Quoted(text)
            }
            b'=' | b'!' | b'<' | b'>' | b'~' => {
                let rest = &source[pos..];
                let (op, len) = [
                    ("===", MarkerOperator::ArbitraryEqual),
                    ("==", MarkerOperator::Equal),
                    ("!=", MarkerOperator::NotEqual),
                    ("~=", MarkerOperator::Compatible),
                    ("<=", MarkerOperator::LessEqual),
                    (">=", MarkerOperator::GreaterEqual),
                    ("<", MarkerOperator::Less),
                    (">", MarkerOperator::Greater),
                ]
                .into_iter()
                .find(|(text, _)| rest.starts_with(text))
                .map(|(text, op)| (op, text.len()))
                .ok_or_else(|| ParseError::new("unknown operator", source, start, start + 1))?;
                pos += len;
                Token::Op(op)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || matches!(bytes[pos], b'_' | b'.'))
                {
                    pos += 1;
                }
                Token::Word(source[start..pos].to_string())
            }
            _ => {
                let width = source[pos..].chars().next().map_or(1, char::len_utf8);
                return Err(ParseError::new(
                    "unexpected character in marker",
                    source,
                    start,
                    start + width,
                ));
            }
        };
        tokens.push(Spanned {
            token,
            start,
            end: pos,
        });
    }
    Ok(tokens)
}

/// Known marker variables, plus the legacy dotted spellings.
fn canonical_variable(word: &str) -> Option<&'static str> {
    Some(match word {
        "python_version" => "python_version",
        "python_full_version" => "python_full_version",
        "implementation_name" => "implementation_name",
        "implementation_version" => "implementation_version",
        "os_name" | "os.name" => "os_name",
        "sys_platform" | "sys.platform" => "sys_platform",
        "platform_release" | "platform.release" => "platform_release",
        "platform_system" => "platform_system",
        "platform_version" | "platform.version" => "platform_version",
        "platform_machine" | "platform.machine" => "platform_machine",
        "platform_python_implementation" | "platform.python_implementation" => {
            "platform_python_implementation"
        }
        "extra" => "extra",
        _ => return None,
    })
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Spanned { token: Token::Word(w), .. }) if w == word)
    }

    fn error_here(&self, message: &str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::new(message, self.source, tok.start, tok.end),
            None => ParseError::new(
                message,
                self.source,
                self.source.len().saturating_sub(1),
                self.source.len(),
            ),
        }
    }

    fn parse_or(&mut self) -> Result<MarkerTree, ParseError> {
        let mut children = vec![self.parse_and()?];
        while self.peek_word("or") {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        Ok(flatten(children, false))
    }

    fn parse_and(&mut self) -> Result<MarkerTree, ParseError> {
        let mut children = vec![self.parse_atom()?];
        while self.peek_word("and") {
            self.pos += 1;
            children.push(self.parse_atom()?);
        }
        Ok(flatten(children, true))
    }

    fn parse_atom(&mut self) -> Result<MarkerTree, ParseError> {
        if matches!(self.peek(), Some(Spanned { token: Token::LParen, .. })) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if !matches!(self.peek(), Some(Spanned { token: Token::RParen, .. })) {
                return Err(self.error_here("expected `)`"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        let lhs = self.parse_value()?;
        let op = self.parse_operator()?;
        let rhs = self.parse_value()?;
        Ok(MarkerTree::Expression(MarkerExpression { lhs, op, rhs }))
    }

    fn parse_value(&mut self) -> Result<MarkerValue, ParseError> {
        let value = match self.peek() {
            Some(Spanned {
                token: Token::Quoted(text),
                ..
            }) => MarkerValue::Literal(text.clone()),
            Some(Spanned {
                token: Token::Word(word),
                ..
            }) => match canonical_variable(word) {
                Some(name) => MarkerValue::Variable(name.to_string()),
                None => return Err(self.error_here("unknown marker variable")),
            },
            _ => return Err(self.error_here("expected a marker variable or quoted string")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn parse_operator(&mut self) -> Result<MarkerOperator, ParseError> {
        let op = match self.peek().map(|t| &t.token) {
            Some(Token::Op(op)) => *op,
            Some(Token::Word(w)) if w == "in" => MarkerOperator::In,
            Some(Token::Word(w)) if w == "not" => MarkerOperator::NotIn,
            _ => return Err(self.error_here("expected a comparison operator")),
        };
        self.pos += 1;
        if op == MarkerOperator::NotIn {
            if !self.peek_word("in") {
                return Err(self.error_here("expected `in` after `not`"));
            }
            self.pos += 1;
        }
        Ok(op)
    }
}

fn flatten(children: Vec<MarkerTree>, conjunction: bool) -> MarkerTree {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match child {
            MarkerTree::And(inner) if conjunction => flat.extend(inner),
            MarkerTree::Or(inner) if !conjunction => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        return flat.remove(0);
    }
    if conjunction {
        MarkerTree::And(flat)
    } else {
        MarkerTree::Or(flat)
    }
}

/// Parse marker text such as `python_version >= "3.8" and os_name == "posix"`.
pub fn parse_marker(text: &str) -> Result<MarkerTree, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::whole("empty marker", text));
    }
    let mut parser = Parser {
        source: text,
        tokens,
        pos: 0,
    };
    let tree = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error_here("unexpected trailing marker text"));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_binds_tighter() {
        let tree = parse_marker(r#"os_name == "nt" or os_name == "posix" and sys_platform == "x""#)
            .unwrap();
        assert!(matches!(&tree, MarkerTree::Or(children) if children.len() == 2));
    }

    #[test]
    fn nested_groups_flatten() {
        let tree = parse_marker(r#"(os_name == "a" and os_name == "b") and os_name == "c""#)
            .unwrap();
        assert!(matches!(&tree, MarkerTree::And(children) if children.len() == 3));
    }

    #[test]
    fn legacy_dotted_names() {
        let tree = parse_marker(r#"os.name == "posix""#).unwrap();
        assert_eq!(tree.to_string(), r#"os_name == "posix""#);
    }
}
