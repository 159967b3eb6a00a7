//! Tokens produced by the tokenizer and consumed once by the builder.

use std::sync::Arc;

use crate::registry::Definition;
use crate::slice::Slice;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Number literal; the text is handed to the number-parsing strategy.
    Number,
    /// String literal including its delimiters. `terminated: false` marks a
    /// shape-invalid token the builder will reject.
    Str { terminated: bool },
    /// `true` or `false`.
    Bool,
    /// A registered construct spelling; the definition rides on the token.
    Construct,
    OpenParen,
    CloseParen,
    ArgSeparator,
    ExprSeparator,
    MemberAccess,
    /// Bare name -- an argument reference at this layer.
    Name,
}

impl TokenKind {
    /// Short human label used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Number => "number literal",
            TokenKind::Str { .. } => "string literal",
            TokenKind::Bool => "boolean literal",
            TokenKind::Construct => "construct",
            TokenKind::OpenParen => "opening parenthesis",
            TokenKind::CloseParen => "closing parenthesis",
            TokenKind::ArgSeparator => "argument separator",
            TokenKind::ExprSeparator => "expression separator",
            TokenKind::MemberAccess => "member access",
            TokenKind::Name => "name",
        }
    }
}

/// An immutable `(kind, source-slice, optional definition)` triple.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub slice: Slice,
    pub definition: Option<Arc<Definition>>,
}

impl Token {
    pub fn new(kind: TokenKind, slice: Slice) -> Self {
        Token {
            kind,
            slice,
            definition: None,
        }
    }

    pub fn construct(slice: Slice, definition: Arc<Definition>) -> Self {
        Token {
            kind: TokenKind::Construct,
            slice,
            definition: Some(definition),
        }
    }

    pub fn text(&self) -> &str {
        self.slice.text()
    }

    pub fn position(&self) -> usize {
        self.slice.position()
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    /// `"construct '+'"` -- kind plus spelling, for error messages.
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.kind.describe(), self.text())
    }
}
