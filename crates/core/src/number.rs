//! Pluggable number-parsing strategy.
//!
//! The tokenizer only decides where a number token ends; turning its text
//! into a [`Value`] is this collaborator's job. Failure is `None`, surfaced
//! by the builder as an error value -- never a panic across the boundary.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::config::ParseConfig;
use crate::value::Value;

pub trait NumberParser {
    /// Parse the exact text of a number token. `None` means the text is not
    /// a representable number under this strategy.
    fn try_parse(&self, text: &str, config: &ParseConfig) -> Option<Value>;
}

/// Default strategy: `i64` for integral literals, `rust_decimal::Decimal`
/// for everything else, honoring the configured decimal point, group
/// separator, and exponent markers.
#[derive(Debug, Default)]
pub struct DecimalNumberParser;

impl NumberParser for DecimalNumberParser {
    fn try_parse(&self, text: &str, config: &ParseConfig) -> Option<Value> {
        let mut normalized = String::with_capacity(text.len());
        let mut fractional = false;
        let mut scientific = false;
        for c in text.chars() {
            if config.group_separator == Some(c) {
                continue;
            }
            if c == config.decimal_point {
                fractional = true;
                normalized.push('.');
                continue;
            }
            if config.is_exponent_marker(c) {
                scientific = true;
                normalized.push('e');
                continue;
            }
            normalized.push(c);
        }

        if scientific {
            return Decimal::from_scientific(&normalized).ok().map(Value::Decimal);
        }
        if fractional {
            return Decimal::from_str(&normalized).ok().map(Value::Decimal);
        }
        // Integral: prefer i64, fall back to Decimal for very large literals.
        normalized
            .parse::<i64>()
            .ok()
            .map(Value::Int)
            .or_else(|| Decimal::from_str(&normalized).ok().map(Value::Decimal))
    }
}
