//! Build errors as values.
//!
//! Every expected failure is a [`BuildError`] tagged with the offending
//! token's position and length. Errors accumulate in an ordered `Vec`
//! instead of short-circuiting, so one parse can report several independent
//! problems. Errors crossing a nesting level are wrapped with the enclosing
//! opening token via [`BuildError::nested`], preserving the full path.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::token::Token;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Token kind/role not in the current expectation set.
    #[error("unexpected {found}")]
    Unexpected { found: String },
    /// No overload of the construct accepts the concrete operand type(s).
    #[error("no overload of '{symbol}' accepts ({operands})")]
    MissingOverload { symbol: String, operands: String },
    /// A role collection was registered but holds no overload at all.
    #[error("construct '{symbol}' has an empty {role} collection")]
    EmptyRole { symbol: String, role: String },
    /// Reported against the still-open opening token.
    #[error("unterminated sub-expression")]
    UnterminatedGroup,
    #[error("unterminated string literal")]
    UnterminatedString,
    /// The number-parsing strategy rejected the token text.
    #[error("invalid number literal '{text}'")]
    InvalidNumber { text: String },
    /// `operands == operators + 1` does not hold.
    #[error("operand/operator imbalance: {operands} operand(s) for {operators} operator(s)")]
    Imbalance { operands: usize, operators: usize },
    #[error("expression is empty")]
    EmptyExpression,
    /// Output reconciliation found no path to the requested type.
    #[error("cannot convert result from {from} to {to}")]
    UnresolvedConversion { from: String, to: String },
    /// A user construct implementation failed while being applied.
    #[error("construct '{symbol}' failed: {message}")]
    ConstructFailed { symbol: String, message: String },
    /// A failure inside a nested sub-expression, wrapped on propagation.
    #[error("nested failure inside '{inside}': {cause}")]
    Nested {
        inside: String,
        cause: Box<BuildError>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildError {
    pub kind: ErrorKind,
    /// Byte offset of the offending token in the source.
    pub position: usize,
    /// Byte length of the offending token.
    pub length: usize,
}

impl BuildError {
    pub fn new(kind: ErrorKind, position: usize, length: usize) -> Self {
        BuildError {
            kind,
            position,
            length,
        }
    }

    /// Error tagged with a token's position and length.
    pub fn at(kind: ErrorKind, token: &Token) -> Self {
        BuildError::new(kind, token.position(), token.len())
    }

    /// Wrap this error with the enclosing opening token, re-tagging the
    /// position to that token.
    pub fn nested(self, enclosing: &Token) -> Self {
        BuildError {
            kind: ErrorKind::Nested {
                inside: enclosing.text().to_owned(),
                cause: Box::new(self),
            },
            position: enclosing.position(),
            length: enclosing.len(),
        }
    }

    /// Serialize to a JSON diagnostic object.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "message":  self.to_string(),
            "position": self.position,
            "length":   self.length,
        })
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.position)
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Nested { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}
