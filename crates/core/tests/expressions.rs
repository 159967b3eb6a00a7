//! End-to-end tests through the public `compile` entry point with the
//! default construct set.

use rust_decimal::Decimal;
use std::str::FromStr;
use trellis_core::{
    builtin, compile, BinaryOps, BuildError, Compiled, DecimalNumberParser, Definition, ErrorKind,
    ParseConfig, UnaryOps, Value, ValueType,
};

fn try_compile(src: &str) -> Result<Compiled, Vec<BuildError>> {
    compile(
        src,
        &ParseConfig::default(),
        &builtin::registry(),
        &DecimalNumberParser,
        ValueType::Any,
    )
}

fn eval(src: &str, args: &[Value]) -> Value {
    try_compile(src).unwrap().eval(args).unwrap()
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(eval("2 + 3 * 4", &[]), Value::Int(14));
}

#[test]
fn parentheses_group_the_sum() {
    assert_eq!(eval("(2 + 3) * 4", &[]), Value::Int(20));
}

#[test]
fn negated_argument() {
    let c = try_compile("-x").unwrap();
    assert_eq!(c.params.names(), ["x"]);
    assert_eq!(c.params.get("x"), Some(0));
    assert_eq!(c.eval(&[Value::Int(5)]).unwrap(), Value::Int(-5));
}

#[test]
fn boolean_conjunction() {
    assert_eq!(eval("true && false", &[]), Value::Bool(false));
}

#[test]
fn trailing_operator_fails_with_no_partial_result() {
    let errs = try_compile("2 +").unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs[0].kind,
        ErrorKind::Imbalance {
            operands: 1,
            operators: 1
        }
    );
}

#[test]
fn unclosed_parenthesis_points_at_the_open_token() {
    let errs = try_compile("(1 + 2").unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].kind, ErrorKind::UnterminatedGroup);
    assert_eq!(errs[0].position, 0);
    assert_eq!(errs[0].length, 1);
}

#[test]
fn arguments_are_deduplicated_in_first_occurrence_order() {
    let c = try_compile("b + a + b").unwrap();
    assert_eq!(c.params.names(), ["b", "a"]);
    assert_eq!(
        c.eval(&[Value::Int(10), Value::Int(1)]).unwrap(),
        Value::Int(21)
    );
}

#[test]
fn independent_errors_are_all_reported() {
    let errs = try_compile("(a b) + (c d)").unwrap_err();
    assert_eq!(errs.len(), 2);
    for err in &errs {
        assert!(matches!(err.kind, ErrorKind::Nested { .. }));
    }
    assert_eq!(errs[0].position, 0);
    assert_eq!(errs[1].position, 8);
}

#[test]
fn algebraic_identity_over_arguments() {
    let c = try_compile("(a + b) * (a - b)").unwrap();
    assert_eq!(c.params.names(), ["a", "b"]);
    assert_eq!(
        c.eval(&[Value::Int(7), Value::Int(3)]).unwrap(),
        Value::Int(40)
    );
}

#[test]
fn strings_compare_and_concatenate() {
    assert_eq!(eval(r#""a" + "b" == "ab""#, &[]), Value::Bool(true));
}

#[test]
fn scientific_literals_divide_as_decimals() {
    let v = eval("1e3 / 1e2", &[]);
    assert_eq!(v.to_string(), "10");
}

#[test]
fn case_insensitive_argument_folding() {
    let cfg = ParseConfig {
        case_sensitive_args: false,
        ..ParseConfig::default()
    };
    let c = compile(
        "Rate + rate",
        &cfg,
        &builtin::registry(),
        &DecimalNumberParser,
        ValueType::Any,
    )
    .unwrap();
    assert_eq!(c.params.names(), ["Rate"]);
    assert_eq!(c.eval(&[Value::Int(2)]).unwrap(), Value::Int(4));
}

#[test]
fn continental_number_dialect() {
    let cfg = ParseConfig {
        decimal_point: ',',
        group_separator: Some('_'),
        ..ParseConfig::default()
    };
    let c = compile(
        "1_000,5 * 2",
        &cfg,
        &builtin::registry(),
        &DecimalNumberParser,
        ValueType::Any,
    )
    .unwrap();
    assert_eq!(
        c.eval(&[]).unwrap(),
        Value::Decimal(Decimal::from_str("2001.0").unwrap())
    );
}

#[test]
fn requested_output_type_converts_the_root() {
    let c = compile(
        "1 + 2",
        &ParseConfig::default(),
        &builtin::registry(),
        &DecimalNumberParser,
        ValueType::Decimal,
    )
    .unwrap();
    assert_eq!(c.eval(&[]).unwrap(), Value::Decimal(Decimal::from(3)));
}

#[test]
fn disabled_auto_convert_refuses_the_mismatch() {
    let cfg = ParseConfig {
        auto_convert: false,
        ..ParseConfig::default()
    };
    let errs = compile(
        "1 + 2",
        &cfg,
        &builtin::registry(),
        &DecimalNumberParser,
        ValueType::Decimal,
    )
    .unwrap_err();
    assert_eq!(
        errs[0].kind,
        ErrorKind::UnresolvedConversion {
            from: "Int".into(),
            to: "Decimal".into()
        }
    );
}

#[test]
fn registry_extension_with_a_dual_role_spelling() {
    // Replace `!` with a definition that is prefix logical-not *and*
    // postfix factorial; the builder sorts out which one each use means.
    let mut reg = builtin::registry();
    reg.insert(
        Definition::new("!")
            .with_prefix(
                UnaryOps::new(builtin::UNARY_PRECEDENCE).generic(ValueType::Bool, |v| match v {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(format!("cannot apply '!' to {}", other.type_name())),
                }),
            )
            .with_postfix(
                UnaryOps::new(builtin::UNARY_PRECEDENCE).generic(ValueType::Int, |v| match v {
                    Value::Int(n) if *n >= 0 => {
                        let mut acc: i64 = 1;
                        for k in 2..=*n {
                            acc = acc
                                .checked_mul(k)
                                .ok_or_else(|| "integer overflow".to_owned())?;
                        }
                        Ok(Value::Int(acc))
                    }
                    _ => Err("factorial needs a non-negative Int".to_owned()),
                }),
            ),
    );
    let c = compile(
        "5! == 120 && !false",
        &ParseConfig::default(),
        &reg,
        &DecimalNumberParser,
        ValueType::Bool,
    )
    .unwrap();
    assert_eq!(c.eval(&[]).unwrap(), Value::Bool(true));
}

#[test]
fn unexpected_operator_is_positioned() {
    let errs = try_compile("1 + + 2").unwrap_err();
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0].kind, ErrorKind::Unexpected { .. }));
    assert_eq!(errs[0].position, 4);
}

#[test]
fn whole_pipeline_error_is_serializable() {
    let errs = try_compile("(1 +").unwrap_err();
    let json = errs[0].to_json_value();
    assert_eq!(json["position"], 0);
    assert!(json["message"].as_str().unwrap().contains("unterminated"));
}

#[test]
fn empty_input_reports_empty_expression() {
    let errs = try_compile("   ").unwrap_err();
    assert_eq!(errs[0].kind, ErrorKind::EmptyExpression);
}

#[test]
fn every_success_is_reproducible_across_parses() {
    // The registry is read-only during parsing; two parses over the same
    // registry see identical results.
    let reg = builtin::registry();
    let cfg = ParseConfig::default();
    for _ in 0..2 {
        let c = compile("x * x", &cfg, &reg, &DecimalNumberParser, ValueType::Any).unwrap();
        assert_eq!(c.eval(&[Value::Int(9)]).unwrap(), Value::Int(81));
    }
}

#[test]
fn binary_ops_used_directly_follow_specialization_rules() {
    // Sanity check on the public overload API the registry exposes.
    let ops = BinaryOps::new(3)
        .generic(ValueType::Any, |_, _| Ok(Value::Int(0)))
        .specialized(ValueType::Int, ValueType::Int, ValueType::Int, |_, _| {
            Ok(Value::Int(1))
        });
    let hit = ops.find(ValueType::Int, ValueType::Int).unwrap();
    assert_eq!(hit.operands, Some((ValueType::Int, ValueType::Int)));
    assert!(ops.find(ValueType::Str, ValueType::Bool).unwrap().operands.is_none());
}
