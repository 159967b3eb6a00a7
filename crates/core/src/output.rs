//! Output reconciliation: align the finished tree's type with the type the
//! caller asked for.
//!
//! Runs once, after the builder hands back the raw tree. `Any` as the
//! requested type means "whatever the expression produces". With automatic
//! conversion enabled the registry's converters are scanned in registration
//! order, first match wins; a runtime-checked cast is the last resort and
//! only fails at evaluation time.

use log::debug;
use std::sync::Arc;

use crate::ast::Expr;
use crate::config::ParseConfig;
use crate::error::{BuildError, ErrorKind};
use crate::registry::Registry;
use crate::value::ValueType;

pub fn reconcile(
    root: Expr,
    requested: ValueType,
    registry: &Registry,
    config: &ParseConfig,
) -> Result<Expr, BuildError> {
    if requested == ValueType::Any {
        return Ok(root);
    }
    let raw = root.result_type();
    if raw == requested {
        return Ok(root);
    }
    if !config.auto_convert {
        // Nothing in this type set widens without computation, so a
        // mismatch with conversion disabled is final.
        return Err(BuildError::new(
            ErrorKind::UnresolvedConversion {
                from: raw.to_string(),
                to: requested.to_string(),
            },
            0,
            0,
        ));
    }
    for def in registry.definitions() {
        for convs in [def.pre_convert(), def.post_convert()].into_iter().flatten() {
            if convs.target() != requested {
                continue;
            }
            if let Some(op) = convs.find(raw) {
                debug!(
                    "reconciling {} -> {} through converter '{}'",
                    raw,
                    requested,
                    def.symbol()
                );
                let op = Arc::clone(op);
                if let Expr::Const(v) = &root {
                    return match (op.apply)(v) {
                        Ok(folded) => Ok(Expr::Const(folded)),
                        Err(message) => Err(BuildError::new(
                            ErrorKind::ConstructFailed {
                                symbol: def.symbol().to_owned(),
                                message,
                            },
                            0,
                            0,
                        )),
                    };
                }
                return Ok(Expr::Convert {
                    symbol: def.symbol().to_owned(),
                    op,
                    target: requested,
                    operand: Box::new(root),
                });
            }
        }
    }
    debug!("no converter from {} to {}, deferring to a runtime check", raw, requested);
    Ok(Expr::CheckedCast {
        target: requested,
        operand: Box::new(root),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EvalError;
    use crate::registry::{Converters, Definition};
    use crate::value::Value;
    use rust_decimal::Decimal;

    fn dec_registry() -> Registry {
        let mut reg = Registry::new();
        reg.insert(Definition::new("dec").with_pre_convert(
            Converters::new(1, ValueType::Decimal).specialized(ValueType::Int, |v| match v {
                Value::Int(a) => Ok(Value::Decimal(Decimal::from(*a))),
                _ => Err("int only".into()),
            }),
        ));
        reg
    }

    #[test]
    fn matching_types_pass_through() {
        let reg = dec_registry();
        let cfg = ParseConfig::default();
        let out = reconcile(Expr::Const(Value::Int(3)), ValueType::Int, &reg, &cfg).unwrap();
        assert!(matches!(out, Expr::Const(Value::Int(3))));
    }

    #[test]
    fn any_requested_means_no_reconciliation() {
        let reg = dec_registry();
        let cfg = ParseConfig::default();
        let out = reconcile(Expr::Const(Value::Str("s".into())), ValueType::Any, &reg, &cfg)
            .unwrap();
        assert!(matches!(out, Expr::Const(Value::Str(_))));
    }

    #[test]
    fn disabled_conversion_rejects_mismatches() {
        let reg = dec_registry();
        let cfg = ParseConfig {
            auto_convert: false,
            ..ParseConfig::default()
        };
        let err = reconcile(Expr::Const(Value::Int(3)), ValueType::Decimal, &reg, &cfg)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnresolvedConversion {
                from: "Int".into(),
                to: "Decimal".into()
            }
        );
    }

    #[test]
    fn registered_converter_folds_a_constant_root() {
        let reg = dec_registry();
        let cfg = ParseConfig::default();
        let out = reconcile(Expr::Const(Value::Int(3)), ValueType::Decimal, &reg, &cfg).unwrap();
        assert!(matches!(
            out,
            Expr::Const(Value::Decimal(d)) if d == Decimal::from(3)
        ));
    }

    #[test]
    fn converter_wraps_a_dynamic_root() {
        let mut reg = Registry::new();
        reg.insert(Definition::new("dec").with_pre_convert(
            Converters::new(1, ValueType::Decimal).generic(|v| match v {
                Value::Int(a) => Ok(Value::Decimal(Decimal::from(*a))),
                Value::Decimal(d) => Ok(Value::Decimal(*d)),
                other => Err(format!("cannot widen {}", other.type_name())),
            }),
        ));
        let cfg = ParseConfig::default();
        let root = Expr::Arg {
            name: "x".into(),
            index: 0,
        };
        let out = reconcile(root, ValueType::Decimal, &reg, &cfg).unwrap();
        assert_eq!(out.result_type(), ValueType::Decimal);
        assert_eq!(
            out.eval(&[Value::Int(7)]),
            Ok(Value::Decimal(Decimal::from(7)))
        );
    }

    #[test]
    fn checked_cast_is_the_last_resort() {
        let reg = Registry::new();
        let cfg = ParseConfig::default();
        let root = Expr::Arg {
            name: "x".into(),
            index: 0,
        };
        let out = reconcile(root, ValueType::Bool, &reg, &cfg).unwrap();
        assert!(matches!(out, Expr::CheckedCast { .. }));
        assert_eq!(out.eval(&[Value::Bool(true)]), Ok(Value::Bool(true)));
        assert_eq!(
            out.eval(&[Value::Int(1)]),
            Err(EvalError::CastFailed {
                expected: ValueType::Bool,
                got: ValueType::Int
            })
        );
    }
}
