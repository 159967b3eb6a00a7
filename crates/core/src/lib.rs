//! Trellis core: the parsing-and-construction engine of a configurable
//! expression language.
//!
//! An input string is turned, under user-supplied syntax rules, into an
//! executable expression tree plus a map of the argument names it
//! references. There is no fixed grammar: the operator alphabet, the roles
//! a spelling can play, and the overloads per operand type all come from a
//! caller-owned [`Registry`]. The pipeline is tokenize ([`Tokenizer`]) →
//! build ([`Builder`]) → reconcile the result type ([`output::reconcile`]),
//! and [`compile`] runs all three.
//!
//! Failures are values: one parse accumulates every independent problem as
//! a [`BuildError`] instead of stopping at the first. Evaluation of the
//! finished tree is a plain walk over [`Expr`] against a positional
//! argument array.
//!
//! ```
//! use trellis_core::{builtin, compile, DecimalNumberParser, ParseConfig, Value, ValueType};
//!
//! let registry = builtin::registry();
//! let config = ParseConfig::default();
//! let compiled = compile("price * (1 + rate)", &config, &registry,
//!     &DecimalNumberParser, ValueType::Any).unwrap();
//! assert_eq!(compiled.params.names(), ["price", "rate"]);
//! let out = compiled.eval(&[Value::Int(200), Value::Int(0)]).unwrap();
//! assert_eq!(out, Value::Int(200));
//! ```

pub mod ast;
pub mod builder;
pub mod builtin;
pub mod config;
pub mod error;
pub mod lexer;
pub mod number;
pub mod output;
pub mod params;
pub mod registry;
pub mod slice;
pub mod token;
pub mod value;

pub use ast::{EvalError, Expr};
pub use builder::{Builder, Expect};
pub use config::ParseConfig;
pub use error::{BuildError, ErrorKind};
pub use lexer::Tokenizer;
pub use number::{DecimalNumberParser, NumberParser};
pub use params::ArgMap;
pub use registry::{BinaryOps, Converters, Definition, Registry, Roles, UnaryOps};
pub use slice::Slice;
pub use token::{Token, TokenKind};
pub use value::{Value, ValueType};

/// A successfully compiled expression: the tree plus the positional slots
/// of every argument name it references.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub root: Expr,
    pub params: ArgMap,
}

impl Compiled {
    /// Evaluate against one argument value per slot in [`Compiled::params`].
    pub fn eval(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.root.eval(args)
    }
}

/// Tokenize, build, and reconcile one expression. `requested` is the type
/// the caller wants the tree to produce; [`ValueType::Any`] accepts
/// whatever the expression yields.
pub fn compile(
    source: &str,
    config: &ParseConfig,
    registry: &Registry,
    numbers: &dyn NumberParser,
    requested: ValueType,
) -> Result<Compiled, Vec<BuildError>> {
    let mut builder = Builder::new(config, numbers);
    for token in Tokenizer::new(source, config, registry) {
        builder.feed(token);
    }
    let (root, params) = builder.finish()?;
    let root = output::reconcile(root, requested, registry, config).map_err(|e| vec![e])?;
    Ok(Compiled { root, params })
}
