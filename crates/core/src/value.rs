//! Runtime values and the type keys used for overload selection.
//!
//! The builder selects operator overloads by the *concrete* result type of
//! each operand. [`ValueType`] is that key; [`ValueType::Any`] is the
//! statically-unknown type reported by argument references, and it doubles
//! as the "no requested output type" marker during reconciliation.

use rust_decimal::Decimal;
use std::fmt;

/// Type key for overload selection and output reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Decimal,
    Str,
    /// Statically unknown -- resolved at evaluation time.
    Any,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Decimal => "Decimal",
            ValueType::Str => "Str",
            ValueType::Any => "Any",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete runtime value.
///
/// Non-integer numbers use `rust_decimal::Decimal`; no `f64` appears
/// anywhere in the evaluation path.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Str(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Str(_) => ValueType::Str,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => f.write_str(s),
        }
    }
}
