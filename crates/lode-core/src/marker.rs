//! Environment markers: predicates over target platform attributes.
//!
//! Grammar:
//!
//! ```text
//! marker  := or
//! or      := and ("or" and)*
//! and     := atom ("and" atom)*
//! atom    := "(" marker ")" | operand op operand
//! operand := IDENT | "'" text "'" | '"' text '"'
//! op      := "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not in"
//! ```
//!
//! Evaluation is three-valued. A comparison that reads an attribute the
//! target does not define evaluates to unknown, and `and`/`or` combine
//! unknowns with Kleene logic. Callers decide what an unknown result means.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    In,
    NotIn,
}

impl MarkerOp {
    fn as_str(self) -> &'static str {
        match self {
            MarkerOp::Eq => "==",
            MarkerOp::NotEq => "!=",
            MarkerOp::Less => "<",
            MarkerOp::LessEq => "<=",
            MarkerOp::Greater => ">",
            MarkerOp::GreaterEq => ">=",
            MarkerOp::In => "in",
            MarkerOp::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operand {
    /// An environment attribute such as `os` or `runtime_version`.
    Attr(String),
    Literal(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Attr(name) => f.write_str(name),
            Operand::Literal(text) if text.contains('"') => write!(f, "'{text}'"),
            Operand::Literal(text) => write!(f, "\"{text}\""),
        }
    }
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnvironmentMarker {
    /// Always true; the marker of an unconditional edge.
    Any,
    Compare {
        lhs: Operand,
        op: MarkerOp,
        rhs: Operand,
    },
    And(Vec<EnvironmentMarker>),
    Or(Vec<EnvironmentMarker>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid marker `{input}`: {reason}")]
pub struct MarkerParseError {
    pub input: String,
    pub reason: String,
}

/// Attributes describing the platform a resolution or install targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetEnvironment {
    attrs: BTreeMap<String, String>,
}

impl TargetEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attributes of the machine lode is running on.
    pub fn host() -> Self {
        let mut env = Self::new();
        env.set("os", std::env::consts::OS);
        env.set("arch", std::env::consts::ARCH);
        env.set("family", std::env::consts::FAMILY);
        env
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    pub fn merged(mut self, other: &TargetEnvironment) -> Self {
        for (k, v) in &other.attrs {
            self.attrs.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl EnvironmentMarker {
    pub fn parse(input: &str) -> Result<Self, MarkerParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(EnvironmentMarker::Any);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            input,
        };
        let marker = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(marker)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, EnvironmentMarker::Any)
    }

    /// Conjunction, flattening nested `and`s and dropping `Any`.
    pub fn and(self, other: EnvironmentMarker) -> EnvironmentMarker {
        let mut parts = Vec::new();
        for m in [self, other] {
            match m {
                EnvironmentMarker::Any => {}
                EnvironmentMarker::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        dedup(&mut parts);
        match parts.len() {
            0 => EnvironmentMarker::Any,
            1 => parts.remove(0),
            _ => EnvironmentMarker::And(parts),
        }
    }

    /// Disjunction, flattening nested `or`s. `Any` absorbs everything.
    pub fn or(self, other: EnvironmentMarker) -> EnvironmentMarker {
        let mut parts = Vec::new();
        for m in [self, other] {
            match m {
                EnvironmentMarker::Any => return EnvironmentMarker::Any,
                EnvironmentMarker::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        dedup(&mut parts);
        match parts.len() {
            1 => parts.remove(0),
            _ => EnvironmentMarker::Or(parts),
        }
    }

    /// Three-valued evaluation: `None` when an attribute the result depends
    /// on is not defined by `env`.
    pub fn evaluate(&self, env: &TargetEnvironment) -> Option<bool> {
        match self {
            EnvironmentMarker::Any => Some(true),
            EnvironmentMarker::Compare { lhs, op, rhs } => compare(lhs, *op, rhs, env),
            EnvironmentMarker::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(env) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            EnvironmentMarker::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(env) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
        }
    }

    /// Whether an edge guarded by this marker must be considered for `env`.
    /// Unknown counts as active, so an edge is only pruned when the target
    /// provably excludes it.
    pub fn is_active(&self, env: &TargetEnvironment) -> bool {
        self.evaluate(env).unwrap_or(true)
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentMarker::Or(_) => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

fn dedup(parts: &mut Vec<EnvironmentMarker>) {
    let mut seen = Vec::with_capacity(parts.len());
    parts.retain(|p| {
        if seen.contains(p) {
            false
        } else {
            seen.push(p.clone());
            true
        }
    });
}

fn compare(lhs: &Operand, op: MarkerOp, rhs: &Operand, env: &TargetEnvironment) -> Option<bool> {
    let resolve = |operand: &Operand| -> Option<String> {
        match operand {
            Operand::Attr(name) => env.get(name).map(str::to_string),
            Operand::Literal(text) => Some(text.clone()),
        }
    };
    let left = resolve(lhs)?;
    let right = resolve(rhs)?;

    let versioned = [lhs, rhs]
        .iter()
        .any(|o| matches!(o, Operand::Attr(name) if name.ends_with("version")));

    let ordering = match (versioned, Version::parse(&left), Version::parse(&right)) {
        (true, Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(&right),
    };
    Some(match op {
        MarkerOp::In => right.contains(left.as_str()),
        MarkerOp::NotIn => !right.contains(left.as_str()),
        MarkerOp::Eq => ordering.is_eq(),
        MarkerOp::NotEq => !ordering.is_eq(),
        MarkerOp::Less => ordering.is_lt(),
        MarkerOp::LessEq => ordering.is_le(),
        MarkerOp::Greater => ordering.is_gt(),
        MarkerOp::GreaterEq => ordering.is_ge(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Op(MarkerOp),
    And,
    Or,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, MarkerParseError> {
    let err = |reason: &str| MarkerParseError {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| err("unterminated string"))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' | '!' | '<' | '>' => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let (op, width) = match two.as_str() {
                    "==" => (MarkerOp::Eq, 2),
                    "!=" => (MarkerOp::NotEq, 2),
                    "<=" => (MarkerOp::LessEq, 2),
                    ">=" => (MarkerOp::GreaterEq, 2),
                    _ if c == '<' => (MarkerOp::Less, 1),
                    _ if c == '>' => (MarkerOp::Greater, 1),
                    _ => return Err(err("unknown operator")),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            _ if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::Op(MarkerOp::In)),
                    "not" => tokens.push(Token::Op(MarkerOp::NotIn)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            _ => return Err(err(&format!("unexpected character `{c}`"))),
        }
    }

    // `not` is only meaningful as the first half of `not in`.
    let mut merged = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if tok == Token::Op(MarkerOp::NotIn) {
            match iter.next() {
                Some(Token::Op(MarkerOp::In)) => merged.push(Token::Op(MarkerOp::NotIn)),
                _ => return Err(err("expected `in` after `not`")),
            }
        } else {
            merged.push(tok);
        }
    }
    Ok(merged)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> MarkerParseError {
        MarkerParseError {
            input: self.input.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<EnvironmentMarker, MarkerParseError> {
        let mut marker = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            marker = marker.or(self.parse_and()?);
        }
        Ok(marker)
    }

    fn parse_and(&mut self) -> Result<EnvironmentMarker, MarkerParseError> {
        let mut marker = self.parse_atom()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            marker = marker.and(self.parse_atom()?);
        }
        Ok(marker)
    }

    fn parse_atom(&mut self) -> Result<EnvironmentMarker, MarkerParseError> {
        if self.peek() == Some(&Token::Open) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.next() != Some(Token::Close) {
                return Err(self.error("expected `)`"));
            }
            return Ok(inner);
        }
        let lhs = self.parse_operand()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        let rhs = self.parse_operand()?;
        Ok(EnvironmentMarker::Compare { lhs, op, rhs })
    }

    fn parse_operand(&mut self) -> Result<Operand, MarkerParseError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(Operand::Attr(name)),
            Some(Token::Str(text)) => Ok(Operand::Literal(text)),
            _ => Err(self.error("expected an attribute name or a quoted string")),
        }
    }
}

impl fmt::Display for EnvironmentMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentMarker::Any => Ok(()),
            EnvironmentMarker::Compare { lhs, op, rhs } => {
                write!(f, "{lhs} {} {rhs}", op.as_str())
            }
            EnvironmentMarker::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    part.fmt_nested(f)?;
                }
                Ok(())
            }
            EnvironmentMarker::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for EnvironmentMarker {
    type Err = MarkerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EnvironmentMarker {
    type Error = MarkerParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EnvironmentMarker> for String {
    fn from(value: EnvironmentMarker) -> Self {
        value.to_string()
    }
}

impl Default for EnvironmentMarker {
    fn default() -> Self {
        EnvironmentMarker::Any
    }
}
