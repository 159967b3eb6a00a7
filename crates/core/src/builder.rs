//! Builder state machine: single-pass tree construction over the token
//! stream.
//!
//! An operator-precedence parser with an explicit operand stack and an
//! explicit pending-construct stack, not recursive descent -- no grammar is
//! statically known, a spelling's role set is configuration-defined, and
//! some spellings are valid in more than one role at the same position.
//!
//! Each nesting level (root plus one per open parenthesis) is a [`State`]
//! in an arena, holding its own stacks, its expectation bitmask, and its
//! operand/operator tally. The argument map is owned by the builder and
//! shared by every level. Token-level failures are recorded and the parse
//! continues, so one pass can report several independent problems.

use bitflags::bitflags;
use log::{debug, trace};
use std::sync::Arc;

use crate::ast::Expr;
use crate::config::ParseConfig;
use crate::error::{BuildError, ErrorKind};
use crate::number::NumberParser;
use crate::params::ArgMap;
use crate::registry::{Definition, Roles};
use crate::token::{Token, TokenKind};
use crate::value::Value;

bitflags! {
    /// Legal next-token categories, recomputed after every accepted token.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Expect: u16 {
        /// Literal, bare name, constant construct, or opening parenthesis.
        const OPERAND      = 1 << 0;
        /// Prefix construct or prefix converter.
        const PREFIX       = 1 << 1;
        const BINARY       = 1 << 2;
        /// Postfix construct or postfix converter.
        const POSTFIX      = 1 << 3;
        const OPEN_GROUP   = 1 << 4;
        const CLOSE_GROUP  = 1 << 5;
    }
}

impl Expect {
    /// Start of an expression or sub-expression.
    fn start() -> Expect {
        Expect::OPERAND | Expect::PREFIX | Expect::OPEN_GROUP
    }
}

/// A construct accepted but not yet applied.
#[derive(Debug)]
enum Pending {
    Binary {
        def: Arc<Definition>,
        token: Token,
        prec: i32,
    },
    Prefix {
        def: Arc<Definition>,
        token: Token,
        prec: i32,
        converter: bool,
    },
    /// Postfix-of-previous-operand or prefix/binary-of-next: undecided
    /// until the following token disambiguates.
    Dual { def: Arc<Definition>, token: Token },
}

impl Pending {
    fn precedence(&self) -> Option<i32> {
        match self {
            Pending::Binary { prec, .. } | Pending::Prefix { prec, .. } => Some(*prec),
            Pending::Dual { .. } => None,
        }
    }
}

/// One nesting level.
#[derive(Debug)]
struct State {
    parent: Option<usize>,
    /// The opening token, for unterminated-group reporting and error
    /// wrapping. `None` only at the root.
    opened_by: Option<Token>,
    operands: Vec<Expr>,
    pending: Vec<Pending>,
    expect: Expect,
    /// Tokens that became operands at this level, not the live stack depth.
    operand_count: usize,
    /// Binary operators accepted at this level.
    operator_count: usize,
}

impl State {
    fn new(parent: Option<usize>, opened_by: Option<Token>) -> Self {
        State {
            parent,
            opened_by,
            operands: Vec::new(),
            pending: Vec::new(),
            expect: Expect::start(),
            operand_count: 0,
            operator_count: 0,
        }
    }
}

pub struct Builder<'a> {
    config: &'a ParseConfig,
    numbers: &'a dyn NumberParser,
    states: Vec<State>,
    active: usize,
    args: ArgMap,
    errors: Vec<BuildError>,
}

fn unexpected(token: &Token) -> BuildError {
    BuildError::at(
        ErrorKind::Unexpected {
            found: token.describe(),
        },
        token,
    )
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a ParseConfig, numbers: &'a dyn NumberParser) -> Self {
        Builder {
            config,
            numbers,
            states: vec![State::new(None, None)],
            active: 0,
            args: ArgMap::new(config.case_sensitive_args),
            errors: Vec::new(),
        }
    }

    fn state(&self) -> &State {
        &self.states[self.active]
    }

    fn state_mut(&mut self) -> &mut State {
        &mut self.states[self.active]
    }

    /// Expectation after a completed operand at the active level.
    fn after_operand(&self) -> Expect {
        let mut e = Expect::BINARY | Expect::POSTFIX;
        if self.state().parent.is_some() {
            e |= Expect::CLOSE_GROUP;
        }
        e
    }

    /// Record an error, wrapping it with each still-open enclosing token on
    /// the way to the root.
    fn record(&mut self, mut err: BuildError) {
        let mut idx = self.active;
        while let (Some(parent), Some(open)) = (
            self.states[idx].parent,
            self.states[idx].opened_by.clone(),
        ) {
            err = err.nested(&open);
            idx = parent;
        }
        debug!("recorded build error: {}", err);
        self.errors.push(err);
    }

    fn require(&self, wanted: Expect, token: &Token) -> Result<(), BuildError> {
        if self.state().expect.intersects(wanted) {
            Ok(())
        } else {
            Err(unexpected(token))
        }
    }

    // ── Token entry points ────────────────────────────────────────

    /// Consume one token. Failures are recorded; the parse continues.
    pub fn feed(&mut self, token: Token) {
        trace!("feed {}", token.describe());
        if let Err(e) = self.try_feed(&token) {
            self.record(e);
        }
    }

    fn try_feed(&mut self, token: &Token) -> Result<(), BuildError> {
        self.resolve_dual(self.starts_operand(token))?;
        match &token.kind {
            TokenKind::Number => {
                self.require(Expect::OPERAND, token)?;
                match self.numbers.try_parse(token.text(), self.config) {
                    Some(v) => {
                        self.push_operand(Expr::Const(v));
                        Ok(())
                    }
                    None => Err(BuildError::at(
                        ErrorKind::InvalidNumber {
                            text: token.text().to_owned(),
                        },
                        token,
                    )),
                }
            }
            TokenKind::Str { terminated } => {
                self.require(Expect::OPERAND, token)?;
                if !terminated {
                    return Err(BuildError::at(ErrorKind::UnterminatedString, token));
                }
                let value = self.unquote(token.text());
                self.push_operand(Expr::Const(Value::Str(value)));
                Ok(())
            }
            TokenKind::Bool => {
                self.require(Expect::OPERAND, token)?;
                self.push_operand(Expr::Const(Value::Bool(token.text() == "true")));
                Ok(())
            }
            TokenKind::Name => {
                self.require(Expect::OPERAND, token)?;
                let name = token.text().to_owned();
                let index = self.args.bind(&name);
                self.push_operand(Expr::Arg { name, index });
                Ok(())
            }
            TokenKind::OpenParen => {
                self.require(Expect::OPEN_GROUP, token)?;
                self.open_group(token);
                Ok(())
            }
            TokenKind::CloseParen => {
                if self.state().parent.is_none() {
                    return Err(unexpected(token));
                }
                let complete = self.state().expect.contains(Expect::CLOSE_GROUP);
                if !complete {
                    // Record the failure but still close the level, so the
                    // rest of the source parses in the right one.
                    self.record(unexpected(token));
                }
                self.close_group(complete);
                Ok(())
            }
            TokenKind::Construct => self.feed_construct(token),
            // Argument lists, statement sequences, and member access belong
            // to outer subsystems; at this layer they are never legal.
            TokenKind::ArgSeparator | TokenKind::ExprSeparator | TokenKind::MemberAccess => {
                Err(unexpected(token))
            }
        }
    }

    /// Strip the delimiters and collapse doubled delimiters.
    fn unquote(&self, text: &str) -> String {
        let delim = self.config.string_delimiter;
        let body = text.strip_prefix(delim).unwrap_or(text);
        let body = body.strip_suffix(delim).unwrap_or(body);
        let doubled: String = [delim, delim].iter().collect();
        body.replace(&doubled, &delim.to_string())
    }

    fn push_operand(&mut self, expr: Expr) {
        let expect = self.after_operand();
        let state = self.state_mut();
        state.operands.push(expr);
        state.operand_count += 1;
        state.expect = expect;
    }

    // ── Construct dispatch ────────────────────────────────────────

    fn feed_construct(&mut self, token: &Token) -> Result<(), BuildError> {
        let def = match &token.definition {
            Some(d) => Arc::clone(d),
            None => return Err(unexpected(token)),
        };
        let expect = self.state().expect;
        let roles = def.roles();

        if expect.intersects(Expect::BINARY | Expect::POSTFIX) {
            // After an operand. A spelling that is postfix *and* could also
            // open the next operand (binary or prefix) stays undecided until
            // the following token.
            if roles.contains(Roles::POSTFIX)
                && roles.intersects(Roles::BINARY | Roles::PREFIX)
            {
                self.push_dual(def, token);
                return Ok(());
            }
            if roles.contains(Roles::BINARY) && expect.contains(Expect::BINARY) {
                return self.accept_binary(&def, token);
            }
            if expect.contains(Expect::POSTFIX) {
                if roles.contains(Roles::POSTFIX) {
                    return self.apply_postfix(&def, token, false);
                }
                if roles.contains(Roles::POST_CONVERT) {
                    return self.apply_postfix(&def, token, true);
                }
            }
            return Err(unexpected(token));
        }

        if expect.intersects(Expect::OPERAND | Expect::PREFIX) {
            if roles.contains(Roles::CONSTANT) && expect.contains(Expect::OPERAND) {
                if let Some(v) = def.constant() {
                    self.push_operand(Expr::Const(v.clone()));
                    return Ok(());
                }
            }
            if expect.contains(Expect::PREFIX) {
                if roles.contains(Roles::PREFIX) {
                    return self.accept_prefix(&def, token, false);
                }
                if roles.contains(Roles::PRE_CONVERT) {
                    return self.accept_prefix(&def, token, true);
                }
            }
            return Err(unexpected(token));
        }

        Err(unexpected(token))
    }

    /// Whether a token can begin an operand, for dual-role resolution. A
    /// construct that is also binary is not treated as an operand opener:
    /// after a dual, its binary reading wins.
    fn starts_operand(&self, token: &Token) -> bool {
        match &token.kind {
            TokenKind::Number
            | TokenKind::Str { .. }
            | TokenKind::Bool
            | TokenKind::Name
            | TokenKind::OpenParen => true,
            TokenKind::Construct => token.definition.as_ref().is_some_and(|d| {
                d.has_role(Roles::PREFIX | Roles::PRE_CONVERT | Roles::CONSTANT)
                    && !d.has_role(Roles::BINARY)
            }),
            _ => false,
        }
    }

    fn push_dual(&mut self, def: Arc<Definition>, token: &Token) {
        debug!("construct '{}' is ambiguous here, deferring", def.symbol());
        let nested = self.state().parent.is_some();
        let state = self.state_mut();
        state.pending.push(Pending::Dual {
            def,
            token: token.clone(),
        });
        // Until resolution both readings stay legal.
        state.expect = Expect::start()
            | Expect::BINARY
            | Expect::POSTFIX
            | if nested { Expect::CLOSE_GROUP } else { Expect::empty() };
    }

    /// Force a pending dual-role construct into its final reading: the
    /// next token opening an operand means it was binary (or prefix when it
    /// has no binary role); anything else, including end of input, means it
    /// was postfix.
    fn resolve_dual(&mut self, operand_follows: bool) -> Result<(), BuildError> {
        let state = self.state_mut();
        if !matches!(state.pending.last(), Some(Pending::Dual { .. })) {
            return Ok(());
        }
        if let Some(Pending::Dual { def, token }) = state.pending.pop() {
            debug!(
                "resolving '{}' as {}",
                def.symbol(),
                if operand_follows {
                    if def.has_role(Roles::BINARY) { "binary" } else { "prefix" }
                } else {
                    "postfix"
                }
            );
            if operand_follows {
                if def.has_role(Roles::BINARY) {
                    self.accept_binary(&def, &token)
                } else {
                    self.accept_prefix(&def, &token, false)
                }
            } else {
                self.apply_postfix(&def, &token, false)
            }
        } else {
            Ok(())
        }
    }

    // ── Acceptance and application ────────────────────────────────

    fn accept_binary(&mut self, def: &Arc<Definition>, token: &Token) -> Result<(), BuildError> {
        let ops = match def.binary() {
            Some(ops) if !ops.is_empty() => ops,
            _ => {
                return Err(BuildError::at(
                    ErrorKind::EmptyRole {
                        symbol: def.symbol().to_owned(),
                        role: "binary".to_owned(),
                    },
                    token,
                ));
            }
        };
        let prec = ops.precedence();
        // Drain everything that binds at least as tightly; ties drain,
        // giving left-associativity.
        self.drain_while(prec);
        let state = self.state_mut();
        state.pending.push(Pending::Binary {
            def: Arc::clone(def),
            token: token.clone(),
            prec,
        });
        state.operator_count += 1;
        state.expect = Expect::start();
        Ok(())
    }

    fn accept_prefix(
        &mut self,
        def: &Arc<Definition>,
        token: &Token,
        converter: bool,
    ) -> Result<(), BuildError> {
        let (prec, empty, role) = if converter {
            match def.pre_convert() {
                Some(c) => (c.precedence(), c.is_empty(), "prefix converter"),
                None => (0, true, "prefix converter"),
            }
        } else {
            match def.prefix() {
                Some(ops) => (ops.precedence(), ops.is_empty(), "prefix"),
                None => (0, true, "prefix"),
            }
        };
        if empty {
            return Err(BuildError::at(
                ErrorKind::EmptyRole {
                    symbol: def.symbol().to_owned(),
                    role: role.to_owned(),
                },
                token,
            ));
        }
        // No draining: prefixes apply right-to-left.
        let state = self.state_mut();
        state.pending.push(Pending::Prefix {
            def: Arc::clone(def),
            token: token.clone(),
            prec,
            converter,
        });
        state.expect = Expect::start();
        Ok(())
    }

    /// Apply a postfix construct (or postfix converter) to the operand on
    /// top of the stack. When the same spelling sits on top of the pending
    /// stack as a prefix, the tighter of the two applies first; on equal
    /// precedence the prefix goes first.
    fn apply_postfix(
        &mut self,
        def: &Arc<Definition>,
        token: &Token,
        converter: bool,
    ) -> Result<(), BuildError> {
        let (prec, empty, role) = if converter {
            match def.post_convert() {
                Some(c) => (c.precedence(), c.is_empty(), "postfix converter"),
                None => (0, true, "postfix converter"),
            }
        } else {
            match def.postfix() {
                Some(ops) => (ops.precedence(), ops.is_empty(), "postfix"),
                None => (0, true, "postfix"),
            }
        };
        if empty {
            return Err(BuildError::at(
                ErrorKind::EmptyRole {
                    symbol: def.symbol().to_owned(),
                    role: role.to_owned(),
                },
                token,
            ));
        }

        if !converter {
            let same_prefix_first = match self.state().pending.last() {
                Some(Pending::Prefix {
                    def: pdef,
                    prec: pprec,
                    converter: false,
                    ..
                }) => pdef.symbol() == def.symbol() && *pprec <= prec,
                _ => false,
            };
            if same_prefix_first {
                if let Some(entry) = self.state_mut().pending.pop() {
                    if let Err(e) = self.apply_pending(entry) {
                        self.record(e);
                    }
                }
            }
        }

        let operand = match self.state_mut().operands.pop() {
            Some(e) => e,
            None => {
                debug_assert!(false, "postfix accepted with no operand on the stack");
                return Err(unexpected(token));
            }
        };
        let result = self.apply_unary(def, token, converter, false, operand)?;
        let expect = self.after_operand();
        let state = self.state_mut();
        state.operands.push(result);
        state.expect = expect;
        Ok(())
    }

    /// Select and run (or defer) a unary/converter overload for one
    /// operand. Constant operands fold at build time; the applier runs at
    /// this single site and its failure becomes one descriptive error.
    fn apply_unary(
        &mut self,
        def: &Arc<Definition>,
        token: &Token,
        converter: bool,
        prefix_position: bool,
        operand: Expr,
    ) -> Result<Expr, BuildError> {
        let symbol = def.symbol().to_owned();
        let operand_type = operand.result_type();
        let found = match (converter, prefix_position) {
            (true, true) => def
                .pre_convert()
                .and_then(|c| c.find(operand_type).map(|op| (Arc::clone(op), c.target()))),
            (true, false) => def
                .post_convert()
                .and_then(|c| c.find(operand_type).map(|op| (Arc::clone(op), c.target()))),
            (false, true) => def
                .prefix()
                .and_then(|ops| ops.find(operand_type).map(|op| (Arc::clone(op), op.result))),
            (false, false) => def
                .postfix()
                .and_then(|ops| ops.find(operand_type).map(|op| (Arc::clone(op), op.result))),
        };
        let (op, target) = match found {
            Some(hit) => hit,
            None => {
                let err = BuildError::at(
                    ErrorKind::MissingOverload {
                        symbol,
                        operands: operand_type.to_string(),
                    },
                    token,
                );
                // Stand-in keeps the stacks consistent for later tokens.
                self.restore_operand(operand);
                return Err(err);
            }
        };
        if let Expr::Const(v) = &operand {
            return match (op.apply)(v) {
                Ok(folded) => Ok(Expr::Const(folded)),
                Err(message) => {
                    let err = BuildError::at(
                        ErrorKind::ConstructFailed { symbol, message },
                        token,
                    );
                    self.restore_operand(operand);
                    Err(err)
                }
            };
        }
        Ok(if converter {
            Expr::Convert {
                symbol,
                op,
                target,
                operand: Box::new(operand),
            }
        } else {
            Expr::Unary {
                symbol,
                op,
                operand: Box::new(operand),
            }
        })
    }

    /// Put a popped operand back after a failed application so later
    /// tokens still see a consistent stack.
    fn restore_operand(&mut self, operand: Expr) {
        let expect = self.after_operand();
        let state = self.state_mut();
        state.operands.push(operand);
        state.expect = expect;
    }

    // ── Pending-stack draining ────────────────────────────────────

    /// Apply pending constructs whose precedence number is at most
    /// `incoming` (they bind at least as tightly), recording failures and
    /// continuing.
    fn drain_while(&mut self, incoming: i32) {
        loop {
            let drain = match self.state().pending.last().and_then(Pending::precedence) {
                Some(prec) => prec <= incoming,
                None => false,
            };
            if !drain {
                return;
            }
            if let Some(entry) = self.state_mut().pending.pop() {
                if let Err(e) = self.apply_pending(entry) {
                    self.record(e);
                }
            }
        }
    }

    /// Apply every pending construct at the active level, top down.
    fn drain_all(&mut self) {
        while let Some(entry) = self.state_mut().pending.pop() {
            if let Err(e) = self.apply_pending(entry) {
                self.record(e);
            }
        }
    }

    fn apply_pending(&mut self, entry: Pending) -> Result<(), BuildError> {
        match entry {
            Pending::Binary { def, token, .. } => self.apply_binary(&def, &token),
            Pending::Prefix {
                def,
                token,
                converter,
                ..
            } => {
                let operand = match self.state_mut().operands.pop() {
                    Some(e) => e,
                    None => {
                        debug_assert!(false, "prefix drained with no operand on the stack");
                        return Err(unexpected(&token));
                    }
                };
                let result = self.apply_unary(&def, &token, converter, true, operand)?;
                self.state_mut().operands.push(result);
                Ok(())
            }
            // A dual still pending during a drain means end-of-context:
            // postfix by definition.
            Pending::Dual { def, token } => self.apply_postfix(&def, &token, false),
        }
    }

    /// Pop two operands and apply a binary overload chosen by their
    /// concrete result types. Both constant: fold now. On failure a
    /// stand-in operand keeps the stacks consistent.
    fn apply_binary(&mut self, def: &Arc<Definition>, token: &Token) -> Result<(), BuildError> {
        let state = self.state_mut();
        let (left, right) = match (state.operands.pop(), state.operands.pop()) {
            (Some(right), Some(left)) => (left, right),
            (recovered, _) => {
                debug_assert!(false, "binary drained with fewer than two operands");
                if let Some(e) = recovered {
                    state.operands.push(e);
                }
                return Err(unexpected(token));
            }
        };
        let symbol = def.symbol().to_owned();
        let (lt, rt) = (left.result_type(), right.result_type());
        let op = match def.binary().and_then(|ops| ops.find(lt, rt)) {
            Some(op) => Arc::clone(op),
            None => {
                let err = BuildError::at(
                    ErrorKind::MissingOverload {
                        symbol,
                        operands: format!("{}, {}", lt, rt),
                    },
                    token,
                );
                self.state_mut().operands.push(left);
                return Err(err);
            }
        };
        if let (Expr::Const(l), Expr::Const(r)) = (&left, &right) {
            return match (op.apply)(l, r) {
                Ok(folded) => {
                    self.state_mut().operands.push(Expr::Const(folded));
                    Ok(())
                }
                Err(message) => {
                    let err = BuildError::at(
                        ErrorKind::ConstructFailed { symbol, message },
                        token,
                    );
                    self.state_mut().operands.push(left);
                    Err(err)
                }
            };
        }
        self.state_mut().operands.push(Expr::Binary {
            symbol,
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
        Ok(())
    }

    // ── Nesting ───────────────────────────────────────────────────

    fn open_group(&mut self, token: &Token) {
        let child = State::new(Some(self.active), Some(token.clone()));
        self.states.push(child);
        self.active = self.states.len() - 1;
    }

    /// Close the active level and hand its operand to the parent. An
    /// incomplete level is not drained: the failure is already recorded and
    /// applying what is pending would only cascade, so any lone operand
    /// stands in for the whole group.
    fn close_group(&mut self, complete: bool) {
        if complete {
            self.drain_all();
        } else {
            self.state_mut().pending.clear();
        }
        let state = self.state_mut();
        let inner = state.operands.pop();
        debug_assert!(
            !complete || state.operands.is_empty(),
            "sub-expression closed with extra operands"
        );
        if let Some(parent) = state.parent {
            self.active = parent;
            if let Some(expr) = inner {
                self.push_operand(expr);
            }
        }
    }

    // ── Finalization ──────────────────────────────────────────────

    /// Force-resolve any pending ambiguity, require balance, drain what
    /// remains, and hand back the one operand plus the argument map -- or
    /// everything that went wrong, in order.
    pub fn finish(mut self) -> Result<(Expr, ArgMap), Vec<BuildError>> {
        if let Err(e) = self.resolve_dual(false) {
            self.record(e);
        }

        if self.states[self.active].parent.is_some() {
            // One error per still-open opening token.
            let mut idx = self.active;
            let mut opens = Vec::new();
            loop {
                let state = &self.states[idx];
                if let Some(open) = &state.opened_by {
                    opens.push(BuildError::at(ErrorKind::UnterminatedGroup, open));
                }
                match state.parent {
                    Some(p) => idx = p,
                    None => break,
                }
            }
            // Innermost last, matching source order of the open tokens.
            opens.reverse();
            self.errors.extend(opens);
            return Err(self.errors);
        }

        let root = &self.states[self.active];
        if root.operand_count == 0 && self.errors.is_empty() {
            self.errors
                .push(BuildError::new(ErrorKind::EmptyExpression, 0, 0));
            return Err(self.errors);
        }
        if root.operand_count != root.operator_count + 1 {
            let err = match root.pending.last() {
                Some(Pending::Binary { token, .. })
                | Some(Pending::Prefix { token, .. })
                | Some(Pending::Dual { token, .. }) => BuildError::at(
                    ErrorKind::Imbalance {
                        operands: root.operand_count,
                        operators: root.operator_count,
                    },
                    token,
                ),
                None => BuildError::new(
                    ErrorKind::Imbalance {
                        operands: root.operand_count,
                        operators: root.operator_count,
                    },
                    0,
                    0,
                ),
            };
            self.errors.push(err);
            return Err(self.errors);
        }

        self.drain_all();
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        match self.state_mut().operands.pop() {
            Some(expr) => Ok((expr, self.args)),
            None => {
                self.errors
                    .push(BuildError::new(ErrorKind::EmptyExpression, 0, 0));
                Err(self.errors)
            }
        }
    }
}
