//! Parse configuration.
//!
//! Everything the lexer and builder need to know about the dialect being
//! parsed: number punctuation, the string delimiter, and the toggles for
//! argument-name case folding and automatic output conversion. The symbol
//! alphabet itself lives on the [`Registry`](crate::registry::Registry),
//! derived from the registered spellings.

use serde::{Deserialize, Serialize};

/// Reserved single-character tokens. These are always lexed as one-character
/// tokens and bound sub-streams; they can never appear inside a registered
/// spelling.
pub const OPEN_PAREN: char = '(';
pub const CLOSE_PAREN: char = ')';
pub const ARG_SEPARATOR: char = ',';
pub const EXPR_SEPARATOR: char = ';';
pub const MEMBER_ACCESS: char = '.';

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Character separating the integer and fractional parts of a number.
    pub decimal_point: char,
    /// Optional digit-group separator, legal only between two digits.
    pub group_separator: Option<char>,
    /// Delimiter opening and closing string literals; doubled inside a
    /// string it denotes one literal delimiter.
    pub string_delimiter: char,
    /// Characters that introduce a scientific-notation exponent.
    pub exponent_markers: Vec<char>,
    /// Whether argument names are matched case-sensitively.
    pub case_sensitive_args: bool,
    /// Whether non-integer and scientific number literals are allowed.
    pub allow_non_integer: bool,
    /// Whether output reconciliation may search registered converters.
    pub auto_convert: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            decimal_point: '.',
            group_separator: None,
            string_delimiter: '"',
            exponent_markers: vec!['e', 'E'],
            case_sensitive_args: true,
            allow_non_integer: true,
            auto_convert: true,
        }
    }
}

impl ParseConfig {
    /// Reserved punctuation always ends a sub-stream and lexes alone.
    pub fn is_reserved(&self, c: char) -> bool {
        matches!(
            c,
            OPEN_PAREN | CLOSE_PAREN | ARG_SEPARATOR | EXPR_SEPARATOR | MEMBER_ACCESS
        ) || c == self.string_delimiter
    }

    pub fn is_exponent_marker(&self, c: char) -> bool {
        self.exponent_markers.contains(&c)
    }
}
