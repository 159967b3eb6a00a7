//! Default construct set: arithmetic, comparison, and logic operators,
//! unary negation and logical not, the `pi`/`tau` constants, and the
//! `int`/`dec`/`str` converters.
//!
//! Every operator collection carries a generic overload dispatching on the
//! runtime value, so argument references (statically `Any`) work without
//! annotation, plus concrete specializations so literal-only expressions
//! fold and keep precise static types. Mixed Int/Decimal arithmetic widens
//! to Decimal. Integer arithmetic is checked; overflow is an error, never a
//! wrap.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::registry::{BinaryOps, Converters, Definition, Registry, UnaryOps};
use crate::value::{Value, ValueType};

pub const UNARY_PRECEDENCE: i32 = 1;
pub const MULTIPLICATIVE_PRECEDENCE: i32 = 2;
pub const ADDITIVE_PRECEDENCE: i32 = 3;
pub const COMPARISON_PRECEDENCE: i32 = 4;
pub const EQUALITY_PRECEDENCE: i32 = 5;
pub const AND_PRECEDENCE: i32 = 6;
pub const OR_PRECEDENCE: i32 = 7;

// ──────────────────────────────────────────────
// Appliers
// ──────────────────────────────────────────────

fn numeric(
    symbol: &str,
    l: &Value,
    r: &Value,
    ints: impl Fn(i64, i64) -> Result<Value, String>,
    decs: impl Fn(Decimal, Decimal) -> Result<Value, String>,
) -> Result<Value, String> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => ints(*a, *b),
        (Value::Int(a), Value::Decimal(b)) => decs(Decimal::from(*a), *b),
        (Value::Decimal(a), Value::Int(b)) => decs(*a, Decimal::from(*b)),
        (Value::Decimal(a), Value::Decimal(b)) => decs(*a, *b),
        _ => Err(format!(
            "cannot apply '{}' to {} and {}",
            symbol,
            l.type_name(),
            r.type_name()
        )),
    }
}

fn add(l: &Value, r: &Value) -> Result<Value, String> {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return Ok(Value::Str(format!("{}{}", a, b)));
    }
    numeric(
        "+",
        l,
        r,
        |a, b| {
            a.checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned())
        },
        |a, b| {
            a.checked_add(b)
                .map(Value::Decimal)
                .ok_or_else(|| "decimal overflow".to_owned())
        },
    )
}

fn sub(l: &Value, r: &Value) -> Result<Value, String> {
    numeric(
        "-",
        l,
        r,
        |a, b| {
            a.checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned())
        },
        |a, b| {
            a.checked_sub(b)
                .map(Value::Decimal)
                .ok_or_else(|| "decimal overflow".to_owned())
        },
    )
}

fn mul(l: &Value, r: &Value) -> Result<Value, String> {
    numeric(
        "*",
        l,
        r,
        |a, b| {
            a.checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned())
        },
        |a, b| {
            a.checked_mul(b)
                .map(Value::Decimal)
                .ok_or_else(|| "decimal overflow".to_owned())
        },
    )
}

fn div(l: &Value, r: &Value) -> Result<Value, String> {
    numeric(
        "/",
        l,
        r,
        |a, b| {
            if b == 0 {
                return Err("division by zero".to_owned());
            }
            // Integer division truncates toward zero.
            a.checked_div(b)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned())
        },
        |a, b| {
            if b.is_zero() {
                return Err("division by zero".to_owned());
            }
            a.checked_div(b)
                .map(Value::Decimal)
                .ok_or_else(|| "decimal overflow".to_owned())
        },
    )
}

fn rem(l: &Value, r: &Value) -> Result<Value, String> {
    numeric(
        "%",
        l,
        r,
        |a, b| {
            if b == 0 {
                return Err("division by zero".to_owned());
            }
            a.checked_rem(b)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned())
        },
        |a, b| {
            if b.is_zero() {
                return Err("division by zero".to_owned());
            }
            a.checked_rem(b)
                .map(Value::Decimal)
                .ok_or_else(|| "decimal overflow".to_owned())
        },
    )
}

fn neg(v: &Value) -> Result<Value, String> {
    match v {
        Value::Int(a) => a
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_owned()),
        Value::Decimal(d) => Ok(Value::Decimal(-*d)),
        other => Err(format!("cannot negate {}", other.type_name())),
    }
}

fn not(v: &Value) -> Result<Value, String> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(format!("cannot apply '!' to {}", other.type_name())),
    }
}

fn compare(l: &Value, r: &Value) -> Result<Ordering, String> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Int(a), Value::Decimal(b)) => Ok(Decimal::from(*a).cmp(b)),
        (Value::Decimal(a), Value::Int(b)) => Ok(a.cmp(&Decimal::from(*b))),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(format!(
            "cannot order {} against {}",
            l.type_name(),
            r.type_name()
        )),
    }
}

fn equals(l: &Value, r: &Value) -> Result<bool, String> {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        // Numeric equality crosses Int/Decimal.
        (Value::Int(_) | Value::Decimal(_), Value::Int(_) | Value::Decimal(_)) => {
            Ok(compare(l, r)? == Ordering::Equal)
        }
        _ => Err(format!(
            "cannot compare {} against {}",
            l.type_name(),
            r.type_name()
        )),
    }
}

fn lt(l: &Value, r: &Value) -> Result<Value, String> {
    Ok(Value::Bool(compare(l, r)? == Ordering::Less))
}

fn le(l: &Value, r: &Value) -> Result<Value, String> {
    Ok(Value::Bool(compare(l, r)? != Ordering::Greater))
}

fn gt(l: &Value, r: &Value) -> Result<Value, String> {
    Ok(Value::Bool(compare(l, r)? == Ordering::Greater))
}

fn ge(l: &Value, r: &Value) -> Result<Value, String> {
    Ok(Value::Bool(compare(l, r)? != Ordering::Less))
}

fn eq(l: &Value, r: &Value) -> Result<Value, String> {
    equals(l, r).map(Value::Bool)
}

fn ne(l: &Value, r: &Value) -> Result<Value, String> {
    equals(l, r).map(|b| Value::Bool(!b))
}

fn and(l: &Value, r: &Value) -> Result<Value, String> {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        _ => Err(format!(
            "cannot apply '&&' to {} and {}",
            l.type_name(),
            r.type_name()
        )),
    }
}

fn or(l: &Value, r: &Value) -> Result<Value, String> {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        _ => Err(format!(
            "cannot apply '||' to {} and {}",
            l.type_name(),
            r.type_name()
        )),
    }
}

fn to_int(v: &Value) -> Result<Value, String> {
    match v {
        Value::Int(a) => Ok(Value::Int(*a)),
        Value::Decimal(d) => d
            .trunc()
            .to_i64()
            .map(Value::Int)
            .ok_or_else(|| format!("{} is out of integer range", d)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("'{}' is not an integer", s)),
        Value::Bool(_) => Err("cannot convert Bool to Int".to_owned()),
    }
}

fn to_decimal(v: &Value) -> Result<Value, String> {
    match v {
        Value::Int(a) => Ok(Value::Decimal(Decimal::from(*a))),
        Value::Decimal(d) => Ok(Value::Decimal(*d)),
        Value::Str(s) => Decimal::from_str(s.trim())
            .map(Value::Decimal)
            .map_err(|_| format!("'{}' is not a number", s)),
        Value::Bool(_) => Err("cannot convert Bool to Decimal".to_owned()),
    }
}

fn to_str(v: &Value) -> Result<Value, String> {
    Ok(Value::Str(v.to_string()))
}

// ──────────────────────────────────────────────
// Registry assembly
// ──────────────────────────────────────────────

fn numeric_binary(precedence: i32, f: fn(&Value, &Value) -> Result<Value, String>) -> BinaryOps {
    use ValueType::{Any, Decimal, Int};
    BinaryOps::new(precedence)
        .generic(Any, f)
        .specialized(Int, Int, Int, f)
        .specialized(Decimal, Decimal, Decimal, f)
        .specialized(Int, Decimal, Decimal, f)
        .specialized(Decimal, Int, Decimal, f)
}

fn boolean_binary(precedence: i32, f: fn(&Value, &Value) -> Result<Value, String>) -> BinaryOps {
    BinaryOps::new(precedence).generic(ValueType::Bool, f)
}

/// The default registry. Callers extend or replace it freely; the builder
/// never assumes these spellings exist.
pub fn registry() -> Registry {
    use ValueType::{Any, Bool, Decimal as Dec, Int, Str};

    let mut reg = Registry::new();

    reg.insert(Definition::new("+").with_binary(
        numeric_binary(ADDITIVE_PRECEDENCE, add).specialized(Str, Str, Str, add),
    ));
    reg.insert(
        Definition::new("-")
            .with_binary(numeric_binary(ADDITIVE_PRECEDENCE, sub))
            .with_prefix(
                UnaryOps::new(UNARY_PRECEDENCE)
                    .generic(Any, neg)
                    .specialized(Int, Int, neg)
                    .specialized(Dec, Dec, neg),
            ),
    );
    reg.insert(Definition::new("*").with_binary(numeric_binary(MULTIPLICATIVE_PRECEDENCE, mul)));
    reg.insert(Definition::new("/").with_binary(numeric_binary(MULTIPLICATIVE_PRECEDENCE, div)));
    reg.insert(Definition::new("%").with_binary(numeric_binary(MULTIPLICATIVE_PRECEDENCE, rem)));

    reg.insert(Definition::new("<").with_binary(boolean_binary(COMPARISON_PRECEDENCE, lt)));
    reg.insert(Definition::new("<=").with_binary(boolean_binary(COMPARISON_PRECEDENCE, le)));
    reg.insert(Definition::new(">").with_binary(boolean_binary(COMPARISON_PRECEDENCE, gt)));
    reg.insert(Definition::new(">=").with_binary(boolean_binary(COMPARISON_PRECEDENCE, ge)));
    reg.insert(Definition::new("==").with_binary(boolean_binary(EQUALITY_PRECEDENCE, eq)));
    reg.insert(Definition::new("!=").with_binary(boolean_binary(EQUALITY_PRECEDENCE, ne)));
    reg.insert(Definition::new("&&").with_binary(boolean_binary(AND_PRECEDENCE, and)));
    reg.insert(Definition::new("||").with_binary(boolean_binary(OR_PRECEDENCE, or)));
    reg.insert(
        Definition::new("!").with_prefix(UnaryOps::new(UNARY_PRECEDENCE).generic(Bool, not)),
    );

    // 18 fractional digits; tau is exactly twice pi so `pi * 2 == tau`.
    reg.insert(
        Definition::new("pi")
            .with_constant(Value::Decimal(rust_decimal::Decimal::new(
                3_141_592_653_589_793_238,
                18,
            ))),
    );
    reg.insert(
        Definition::new("tau")
            .with_constant(Value::Decimal(rust_decimal::Decimal::new(
                6_283_185_307_179_586_476,
                18,
            ))),
    );

    reg.insert(
        Definition::new("int")
            .with_pre_convert(Converters::new(UNARY_PRECEDENCE, Int).generic(to_int)),
    );
    reg.insert(
        Definition::new("dec")
            .with_pre_convert(Converters::new(UNARY_PRECEDENCE, Dec).generic(to_decimal)),
    );
    reg.insert(
        Definition::new("str")
            .with_pre_convert(Converters::new(UNARY_PRECEDENCE, Str).generic(to_str)),
    );

    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseConfig;
    use crate::error::ErrorKind;
    use crate::number::DecimalNumberParser;
    use crate::{compile, Compiled};

    fn run(src: &str) -> Value {
        compiled(src, ValueType::Any).eval(&[]).unwrap()
    }

    fn compiled(src: &str, requested: ValueType) -> Compiled {
        let cfg = ParseConfig::default();
        let reg = registry();
        compile(src, &cfg, &reg, &DecimalNumberParser, requested).unwrap()
    }

    #[test]
    fn arithmetic_precedence_and_folding() {
        assert_eq!(run("2 + 3 * 4"), Value::Int(14));
        assert_eq!(run("(2 + 3) * 4"), Value::Int(20));
        assert_eq!(run("10 - 3 - 2"), Value::Int(5));
    }

    #[test]
    fn mixed_numerics_widen_to_decimal() {
        assert_eq!(
            run("1 + 2.5"),
            Value::Decimal(Decimal::from_str("3.5").unwrap())
        );
        assert_eq!(run("7 / 2"), Value::Int(3));
        assert_eq!(
            run("7.0 / 2"),
            Value::Decimal(Decimal::from_str("3.5").unwrap())
        );
        assert_eq!(run("7 % 4"), Value::Int(3));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run(r#""foo" + "bar""#), Value::Str("foobar".into()));
    }

    #[test]
    fn comparisons_and_equality_cross_numeric_types() {
        assert_eq!(run("2 < 3"), Value::Bool(true));
        assert_eq!(run("2.5 >= 2"), Value::Bool(true));
        assert_eq!(run("1 == 1.0"), Value::Bool(true));
        assert_eq!(run("1 != 2"), Value::Bool(true));
        assert_eq!(run(r#""a" < "b""#), Value::Bool(true));
    }

    #[test]
    fn logic_with_and_binding_tighter_than_or() {
        assert_eq!(run("true && false || true"), Value::Bool(true));
        assert_eq!(run("!true"), Value::Bool(false));
    }

    #[test]
    fn constants_fold_and_relate() {
        assert_eq!(run("pi * 2 == tau"), Value::Bool(true));
    }

    #[test]
    fn conversions_in_expression_position() {
        assert_eq!(run("int 2.9"), Value::Int(2));
        assert_eq!(run("dec 3"), Value::Decimal(Decimal::from(3)));
        assert_eq!(run("str 42"), Value::Str("42".into()));
    }

    #[test]
    fn requested_output_type_reconciles_through_dec() {
        let c = compiled("1 + 2", ValueType::Decimal);
        assert_eq!(c.eval(&[]).unwrap(), Value::Decimal(Decimal::from(3)));
    }

    #[test]
    fn generic_overloads_dispatch_on_runtime_arguments() {
        let c = compiled("x + 1", ValueType::Any);
        assert_eq!(c.eval(&[Value::Int(41)]).unwrap(), Value::Int(42));
        assert_eq!(
            c.eval(&[Value::Decimal(Decimal::from_str("1.5").unwrap())])
                .unwrap(),
            Value::Decimal(Decimal::from_str("2.5").unwrap())
        );
    }

    #[test]
    fn checked_integer_overflow_is_an_error() {
        let cfg = ParseConfig::default();
        let reg = registry();
        let errs = compile(
            "9223372036854775807 + 1",
            &cfg,
            &reg,
            &DecimalNumberParser,
            ValueType::Any,
        )
        .unwrap_err();
        assert_eq!(
            errs[0].kind,
            ErrorKind::ConstructFailed {
                symbol: "+".into(),
                message: "integer overflow".into()
            }
        );
    }

    #[test]
    fn unary_minus_on_argument() {
        let c = compiled("-x", ValueType::Any);
        assert_eq!(c.params.names(), ["x"]);
        assert_eq!(c.eval(&[Value::Int(5)]).unwrap(), Value::Int(-5));
    }
}
