//! Construct registry: per-spelling definitions and their role collections.
//!
//! A [`Definition`] bundles every role one spelling can play. Each role is a
//! collection of one optional generic overload plus any number of overloads
//! specialized by concrete operand type, with a precedence shared by the
//! whole collection. Lower precedence numbers bind tighter; two collections
//! with equal precedence are left-associative by the builder's drain rule.
//!
//! Registration *validation* happens outside this core. The registry only
//! looks definitions up and exposes the symbol alphabet the lexer needs for
//! character classification.

use bitflags::bitflags;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::value::{Value, ValueType};

/// Erased binary applier. Runs at evaluation time, or once at build time
/// when both operands are already constants.
pub type BinaryApplyFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;
/// Erased unary/converter applier.
pub type UnaryApplyFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

bitflags! {
    /// Populated roles of a definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Roles: u8 {
        const BINARY       = 1 << 0;
        const PREFIX       = 1 << 1;
        const POSTFIX      = 1 << 2;
        const PRE_CONVERT  = 1 << 3;
        const POST_CONVERT = 1 << 4;
        const CONSTANT     = 1 << 5;
        const TYPE_LITERAL = 1 << 6;
    }
}

// ──────────────────────────────────────────────
// Overloads
// ──────────────────────────────────────────────

/// One binary overload: operand-type key (`None` = generic), declared
/// result type, and the applier.
pub struct BinaryOp {
    pub operands: Option<(ValueType, ValueType)>,
    pub result: ValueType,
    pub apply: BinaryApplyFn,
}

impl fmt::Debug for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryOp")
            .field("operands", &self.operands)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// One unary or converter overload.
pub struct UnaryOp {
    pub operand: Option<ValueType>,
    pub result: ValueType,
    pub apply: UnaryApplyFn,
}

impl fmt::Debug for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryOp")
            .field("operand", &self.operand)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

// ──────────────────────────────────────────────
// Role collections
// ──────────────────────────────────────────────

/// Binary-operator collection keyed by `(left-type, right-type)`.
#[derive(Debug)]
pub struct BinaryOps {
    precedence: i32,
    generic: Option<Arc<BinaryOp>>,
    specialized: HashMap<(ValueType, ValueType), Arc<BinaryOp>>,
}

impl BinaryOps {
    pub fn new(precedence: i32) -> Self {
        BinaryOps {
            precedence,
            generic: None,
            specialized: HashMap::new(),
        }
    }

    pub fn generic(
        mut self,
        result: ValueType,
        f: impl Fn(&Value, &Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.generic = Some(Arc::new(BinaryOp {
            operands: None,
            result,
            apply: Arc::new(f),
        }));
        self
    }

    pub fn specialized(
        mut self,
        left: ValueType,
        right: ValueType,
        result: ValueType,
        f: impl Fn(&Value, &Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.specialized.insert(
            (left, right),
            Arc::new(BinaryOp {
                operands: Some((left, right)),
                result,
                apply: Arc::new(f),
            }),
        );
        self
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    /// Exact specialization first, generic fallback.
    pub fn find(&self, left: ValueType, right: ValueType) -> Option<&Arc<BinaryOp>> {
        self.specialized.get(&(left, right)).or(self.generic.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.generic.is_none() && self.specialized.is_empty()
    }
}

/// Unary-operator collection keyed by the single operand type.
#[derive(Debug)]
pub struct UnaryOps {
    precedence: i32,
    generic: Option<Arc<UnaryOp>>,
    specialized: HashMap<ValueType, Arc<UnaryOp>>,
}

impl UnaryOps {
    pub fn new(precedence: i32) -> Self {
        UnaryOps {
            precedence,
            generic: None,
            specialized: HashMap::new(),
        }
    }

    pub fn generic(
        mut self,
        result: ValueType,
        f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.generic = Some(Arc::new(UnaryOp {
            operand: None,
            result,
            apply: Arc::new(f),
        }));
        self
    }

    pub fn specialized(
        mut self,
        operand: ValueType,
        result: ValueType,
        f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.specialized.insert(
            operand,
            Arc::new(UnaryOp {
                operand: Some(operand),
                result,
                apply: Arc::new(f),
            }),
        );
        self
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn find(&self, operand: ValueType) -> Option<&Arc<UnaryOp>> {
        self.specialized.get(&operand).or(self.generic.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.generic.is_none() && self.specialized.is_empty()
    }
}

/// Converter collection: one fixed target type, source overloads keyed by
/// operand type. Every overload's result is the collection target.
#[derive(Debug)]
pub struct Converters {
    precedence: i32,
    target: ValueType,
    generic: Option<Arc<UnaryOp>>,
    specialized: HashMap<ValueType, Arc<UnaryOp>>,
}

impl Converters {
    pub fn new(precedence: i32, target: ValueType) -> Self {
        Converters {
            precedence,
            target,
            generic: None,
            specialized: HashMap::new(),
        }
    }

    pub fn generic(
        mut self,
        f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.generic = Some(Arc::new(UnaryOp {
            operand: None,
            result: self.target,
            apply: Arc::new(f),
        }));
        self
    }

    pub fn specialized(
        mut self,
        source: ValueType,
        f: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.specialized.insert(
            source,
            Arc::new(UnaryOp {
                operand: Some(source),
                result: self.target,
                apply: Arc::new(f),
            }),
        );
        self
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn target(&self) -> ValueType {
        self.target
    }

    pub fn find(&self, source: ValueType) -> Option<&Arc<UnaryOp>> {
        self.specialized.get(&source).or(self.generic.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.generic.is_none() && self.specialized.is_empty()
    }
}

// ──────────────────────────────────────────────
// Definition
// ──────────────────────────────────────────────

/// Everything one spelling can mean, immutable and shared read-only across
/// parses.
pub struct Definition {
    symbol: String,
    binary: Option<BinaryOps>,
    prefix: Option<UnaryOps>,
    postfix: Option<UnaryOps>,
    pre_convert: Option<Converters>,
    post_convert: Option<Converters>,
    constant: Option<Value>,
    type_literal: Option<ValueType>,
    roles: Roles,
}

impl Definition {
    pub fn new(symbol: impl Into<String>) -> Self {
        Definition {
            symbol: symbol.into(),
            binary: None,
            prefix: None,
            postfix: None,
            pre_convert: None,
            post_convert: None,
            constant: None,
            type_literal: None,
            roles: Roles::empty(),
        }
    }

    pub fn with_binary(mut self, ops: BinaryOps) -> Self {
        self.binary = Some(ops);
        self.roles |= Roles::BINARY;
        self
    }

    pub fn with_prefix(mut self, ops: UnaryOps) -> Self {
        self.prefix = Some(ops);
        self.roles |= Roles::PREFIX;
        self
    }

    pub fn with_postfix(mut self, ops: UnaryOps) -> Self {
        self.postfix = Some(ops);
        self.roles |= Roles::POSTFIX;
        self
    }

    pub fn with_pre_convert(mut self, convs: Converters) -> Self {
        self.pre_convert = Some(convs);
        self.roles |= Roles::PRE_CONVERT;
        self
    }

    pub fn with_post_convert(mut self, convs: Converters) -> Self {
        self.post_convert = Some(convs);
        self.roles |= Roles::POST_CONVERT;
        self
    }

    pub fn with_constant(mut self, value: Value) -> Self {
        self.constant = Some(value);
        self.roles |= Roles::CONSTANT;
        self
    }

    pub fn with_type_literal(mut self, ty: ValueType) -> Self {
        self.type_literal = Some(ty);
        self.roles |= Roles::TYPE_LITERAL;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    pub fn has_role(&self, roles: Roles) -> bool {
        self.roles.intersects(roles)
    }

    pub fn binary(&self) -> Option<&BinaryOps> {
        self.binary.as_ref()
    }

    pub fn prefix(&self) -> Option<&UnaryOps> {
        self.prefix.as_ref()
    }

    pub fn postfix(&self) -> Option<&UnaryOps> {
        self.postfix.as_ref()
    }

    pub fn pre_convert(&self) -> Option<&Converters> {
        self.pre_convert.as_ref()
    }

    pub fn post_convert(&self) -> Option<&Converters> {
        self.post_convert.as_ref()
    }

    pub fn constant(&self) -> Option<&Value> {
        self.constant.as_ref()
    }

    pub fn type_literal(&self) -> Option<ValueType> {
        self.type_literal
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("symbol", &self.symbol)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Read-only during parsing; safely shared across independent parses.
#[derive(Debug, Default)]
pub struct Registry {
    map: HashMap<String, Arc<Definition>>,
    order: Vec<String>,
    alphabet: HashSet<char>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a definition under its exact spelling. Re-registering a
    /// spelling replaces the previous definition but keeps its original
    /// position in registration order.
    pub fn insert(&mut self, def: Definition) {
        let symbol = def.symbol().to_owned();
        for c in symbol.chars() {
            if !(c.is_alphanumeric() || c == '_') {
                self.alphabet.insert(c);
            }
        }
        if self.map.insert(symbol.clone(), Arc::new(def)).is_none() {
            self.order.push(symbol);
        }
    }

    pub fn find(&self, symbol: &str) -> Option<&Arc<Definition>> {
        self.map.get(symbol)
    }

    /// Definitions in registration order. Output reconciliation scans these
    /// first-match-wins.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.order.iter().filter_map(|s| self.map.get(s))
    }

    /// Whether `c` belongs to the symbol alphabet of registered spellings.
    pub fn is_symbol_char(&self, c: char) -> bool {
        self.alphabet.contains(&c)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_binary(prec: i32) -> BinaryOps {
        BinaryOps::new(prec).generic(ValueType::Int, |_, _| Ok(Value::Int(0)))
    }

    #[test]
    fn roles_track_populated_collections() {
        let def = Definition::new("+")
            .with_binary(dummy_binary(3))
            .with_prefix(UnaryOps::new(1).generic(ValueType::Int, |v| Ok(v.clone())));
        assert!(def.has_role(Roles::BINARY));
        assert!(def.has_role(Roles::PREFIX));
        assert!(!def.has_role(Roles::POSTFIX));
        assert_eq!(def.roles(), Roles::BINARY | Roles::PREFIX);
    }

    #[test]
    fn specialized_lookup_beats_generic() {
        let ops = BinaryOps::new(3)
            .generic(ValueType::Any, |_, _| Ok(Value::Int(0)))
            .specialized(ValueType::Int, ValueType::Int, ValueType::Int, |_, _| {
                Ok(Value::Int(1))
            });
        let hit = ops.find(ValueType::Int, ValueType::Int).unwrap();
        assert_eq!(hit.operands, Some((ValueType::Int, ValueType::Int)));
        let miss = ops.find(ValueType::Str, ValueType::Int).unwrap();
        assert_eq!(miss.operands, None);
    }

    #[test]
    fn absent_overloads_is_none() {
        let ops = BinaryOps::new(3);
        assert!(ops.is_empty());
        assert!(ops.find(ValueType::Int, ValueType::Int).is_none());
    }

    #[test]
    fn alphabet_collects_symbol_chars_only() {
        let mut reg = Registry::new();
        reg.insert(Definition::new("<=").with_binary(dummy_binary(4)));
        reg.insert(Definition::new("mod").with_binary(dummy_binary(2)));
        assert!(reg.is_symbol_char('<'));
        assert!(reg.is_symbol_char('='));
        assert!(!reg.is_symbol_char('m'));
        assert!(!reg.is_symbol_char('o'));
    }

    #[test]
    fn definitions_iterate_in_registration_order() {
        let mut reg = Registry::new();
        reg.insert(Definition::new("a").with_constant(Value::Int(1)));
        reg.insert(Definition::new("b").with_constant(Value::Int(2)));
        reg.insert(Definition::new("c").with_constant(Value::Int(3)));
        let order: Vec<_> = reg.definitions().map(|d| d.symbol().to_owned()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }
}
