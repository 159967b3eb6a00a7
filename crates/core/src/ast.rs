//! The executable expression tree the builder produces.
//!
//! Each node carries the overload chosen during construction, so evaluation
//! is a plain walk: no re-dispatch, no registry access. `eval` over a
//! positional argument array is the callable unit the host receives.

use std::sync::Arc;
use thiserror::Error;

use crate::registry::{BinaryOp, UnaryOp};
use crate::value::{Value, ValueType};

#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal or folded constant.
    Const(Value),
    /// Positional read of the argument array.
    Arg { name: String, index: usize },
    Binary {
        symbol: String,
        op: Arc<BinaryOp>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        symbol: String,
        op: Arc<UnaryOp>,
        operand: Box<Expr>,
    },
    Convert {
        symbol: String,
        op: Arc<UnaryOp>,
        target: ValueType,
        operand: Box<Expr>,
    },
    /// Last-resort output reconciliation: checked at evaluation time.
    CheckedCast {
        target: ValueType,
        operand: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("argument '{name}' (slot {index}) missing from argument array")]
    MissingArgument { name: String, index: usize },
    #[error("construct '{symbol}' failed: {message}")]
    ConstructFailed { symbol: String, message: String },
    #[error("runtime cast to {expected} failed: value is {got}")]
    CastFailed { expected: ValueType, got: ValueType },
}

impl Expr {
    /// Concrete result type of this node; `Any` when only evaluation can
    /// tell (argument reads and generic overloads).
    pub fn result_type(&self) -> ValueType {
        match self {
            Expr::Const(v) => v.value_type(),
            Expr::Arg { .. } => ValueType::Any,
            Expr::Binary { op, .. } => op.result,
            Expr::Unary { op, .. } => op.result,
            Expr::Convert { target, .. } => *target,
            Expr::CheckedCast { target, .. } => *target,
        }
    }

    /// Evaluate against a positional argument array.
    pub fn eval(&self, args: &[Value]) -> Result<Value, EvalError> {
        match self {
            Expr::Const(v) => Ok(v.clone()),
            Expr::Arg { name, index } => {
                args.get(*index)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingArgument {
                        name: name.clone(),
                        index: *index,
                    })
            }
            Expr::Binary {
                symbol,
                op,
                left,
                right,
            } => {
                let l = left.eval(args)?;
                let r = right.eval(args)?;
                (op.apply)(&l, &r).map_err(|message| EvalError::ConstructFailed {
                    symbol: symbol.clone(),
                    message,
                })
            }
            Expr::Unary {
                symbol,
                op,
                operand,
            } => {
                let v = operand.eval(args)?;
                (op.apply)(&v).map_err(|message| EvalError::ConstructFailed {
                    symbol: symbol.clone(),
                    message,
                })
            }
            Expr::Convert {
                symbol,
                op,
                operand,
                ..
            } => {
                let v = operand.eval(args)?;
                (op.apply)(&v).map_err(|message| EvalError::ConstructFailed {
                    symbol: symbol.clone(),
                    message,
                })
            }
            Expr::CheckedCast { target, operand } => {
                let v = operand.eval(args)?;
                if v.value_type() == *target {
                    Ok(v)
                } else {
                    Err(EvalError::CastFailed {
                        expected: *target,
                        got: v.value_type(),
                    })
                }
            }
        }
    }
}
