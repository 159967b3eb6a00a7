//! Tokenizer: a lazy, forward-only token sequence over the input.
//!
//! Reserved punctuation always lexes alone. Digits start a number scan with
//! checkpointed sub-states for the fraction and exponent, so a malformed
//! trailing `.`/`e`/`e+` backtracks to the last well-formed number. The
//! string delimiter starts a scan with escape-by-doubling. Any other
//! character opens a bounded *sub-stream* up to the next whitespace or
//! reserved character, inside which contiguous symbol runs are resolved
//! longest-match-first against the registry, with unmatched leading symbol
//! characters peeled one at a time and re-offered as plain text.
//!
//! A malformed token (unterminated string) is still produced, shape-marked,
//! and rejected by the builder -- the tokenizer itself never fails.

use log::debug;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{self, ParseConfig};
use crate::registry::{Definition, Registry};
use crate::slice::Slice;
use crate::token::{Token, TokenKind};

pub struct Tokenizer<'a> {
    source: Arc<str>,
    /// Byte offset + character, for one-character stepping with byte-exact
    /// slices.
    chars: Vec<(usize, char)>,
    pos: usize,
    config: &'a ParseConfig,
    registry: &'a Registry,
    /// Extra tokens produced by sub-stream splitting, drained first.
    pending: VecDeque<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &str, config: &'a ParseConfig, registry: &'a Registry) -> Self {
        let source: Arc<str> = Arc::from(source);
        let chars = source.char_indices().collect();
        Tokenizer {
            source,
            chars,
            pos: 0,
            config,
            registry,
            pending: VecDeque::new(),
        }
    }

    fn ch(&self, idx: usize) -> Option<char> {
        self.chars.get(idx).map(|&(_, c)| c)
    }

    fn byte_at(&self, idx: usize) -> usize {
        self.chars
            .get(idx)
            .map(|&(b, _)| b)
            .unwrap_or(self.source.len())
    }

    fn slice(&self, from: usize, to: usize) -> Slice {
        Slice::new(
            Arc::clone(&self.source),
            self.byte_at(from),
            self.byte_at(to),
        )
    }

    fn is_digit(&self, idx: usize) -> bool {
        self.ch(idx).is_some_and(|c| c.is_ascii_digit())
    }

    // ── Number scan ───────────────────────────────────────────────

    fn consume_integer_digits(&mut self) {
        loop {
            match self.ch(self.pos) {
                Some(c) if c.is_ascii_digit() => self.pos += 1,
                // Group separator only between two digits.
                Some(c)
                    if self.config.group_separator == Some(c)
                        && self.pos >= 1
                        && self.chars[self.pos - 1].1.is_ascii_digit()
                        && self.is_digit(self.pos + 1) =>
                {
                    self.pos += 1;
                }
                _ => break,
            }
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        self.consume_integer_digits();

        if self.config.allow_non_integer {
            // Fraction: decimal point only consumed when a digit follows;
            // otherwise the token ends here and the point lexes on its own.
            if self.ch(self.pos) == Some(self.config.decimal_point) && self.is_digit(self.pos + 1)
            {
                self.pos += 1;
                while self.is_digit(self.pos) {
                    self.pos += 1;
                }
            }
            // Exponent: marker (and optional sign) only consumed when a
            // digit follows -- the backtrack for `1e` / `1e+`.
            if let Some(c) = self.ch(self.pos) {
                if self.config.is_exponent_marker(c) {
                    if self.is_digit(self.pos + 1) {
                        self.pos += 2;
                    } else if matches!(self.ch(self.pos + 1), Some('+') | Some('-'))
                        && self.is_digit(self.pos + 2)
                    {
                        self.pos += 3;
                    }
                    while self.is_digit(self.pos) {
                        self.pos += 1;
                    }
                }
            }
        }

        Token::new(TokenKind::Number, self.slice(start, self.pos))
    }

    // ── String scan ───────────────────────────────────────────────

    fn scan_string(&mut self) -> Token {
        let start = self.pos;
        let delim = self.config.string_delimiter;
        self.pos += 1;
        loop {
            match self.ch(self.pos) {
                None => {
                    return Token::new(
                        TokenKind::Str { terminated: false },
                        self.slice(start, self.pos),
                    );
                }
                Some(c) if c == delim => {
                    // Two consecutive delimiters are one literal delimiter.
                    if self.ch(self.pos + 1) == Some(delim) {
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        return Token::new(
                            TokenKind::Str { terminated: true },
                            self.slice(start, self.pos),
                        );
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    // ── Sub-stream scan ───────────────────────────────────────────

    /// Resolve a contiguous symbol run `[from, to)` into construct tokens,
    /// longest match first, peeling unmatched leading characters into a
    /// plain-text token.
    fn resolve_symbol_run(&self, from: usize, to: usize, out: &mut Vec<Token>) {
        let mut k = from;
        let mut peel_start = from;
        while k < to {
            let mut found: Option<(usize, Arc<Definition>)> = None;
            for cand_end in ((k + 1)..=to).rev() {
                let text = &self.source[self.byte_at(k)..self.byte_at(cand_end)];
                if let Some(def) = self.registry.find(text) {
                    found = Some((cand_end, Arc::clone(def)));
                    break;
                }
            }
            match found {
                Some((cand_end, def)) => {
                    if peel_start < k {
                        let peeled = self.slice(peel_start, k);
                        debug!("re-offering peeled symbol text {:?} as name", peeled.text());
                        out.push(Token::new(TokenKind::Name, peeled));
                    }
                    out.push(Token::construct(self.slice(k, cand_end), def));
                    k = cand_end;
                    peel_start = k;
                }
                None => k += 1,
            }
        }
        if peel_start < to {
            let leftover = self.slice(peel_start, to);
            debug!("symbol run leftover {:?} lexed as name", leftover.text());
            out.push(Token::new(TokenKind::Name, leftover));
        }
    }

    fn scan_substream(&mut self) -> Option<Token> {
        let start = self.pos;
        let mut end = start;
        while let Some(c) = self.ch(end) {
            if c.is_whitespace() || self.config.is_reserved(c) {
                break;
            }
            end += 1;
        }

        let mut out: Vec<Token> = Vec::new();
        let mut i = start;
        while i < end {
            let c = match self.ch(i) {
                Some(c) => c,
                None => break,
            };
            // A digit right after a symbol run starts a fresh number scan.
            if c.is_ascii_digit() {
                break;
            }
            if self.registry.is_symbol_char(c) {
                let mut j = i;
                while j < end && self.ch(j).is_some_and(|c| self.registry.is_symbol_char(c)) {
                    j += 1;
                }
                self.resolve_symbol_run(i, j, &mut out);
                i = j;
            } else {
                // Identifier run: everything up to the next symbol char.
                let mut j = i;
                while j < end
                    && self
                        .ch(j)
                        .is_some_and(|c| !self.registry.is_symbol_char(c))
                {
                    j += 1;
                }
                let slice = self.slice(i, j);
                let tok = match self.registry.find(slice.text()) {
                    Some(def) => Token::construct(slice, Arc::clone(def)),
                    None if slice.text() == "true" || slice.text() == "false" => {
                        Token::new(TokenKind::Bool, slice)
                    }
                    None => Token::new(TokenKind::Name, slice),
                };
                out.push(tok);
                i = j;
            }
        }
        self.pos = i;

        let mut it = out.into_iter();
        let first = it.next();
        self.pending.extend(it);
        first
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(t) = self.pending.pop_front() {
            return Some(t);
        }
        while let Some(c) = self.ch(self.pos) {
            if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let c = self.ch(self.pos)?;

        if c.is_ascii_digit() {
            return Some(self.scan_number());
        }
        if c == self.config.string_delimiter {
            return Some(self.scan_string());
        }
        let reserved = match c {
            config::OPEN_PAREN => Some(TokenKind::OpenParen),
            config::CLOSE_PAREN => Some(TokenKind::CloseParen),
            config::ARG_SEPARATOR => Some(TokenKind::ArgSeparator),
            config::EXPR_SEPARATOR => Some(TokenKind::ExprSeparator),
            config::MEMBER_ACCESS => Some(TokenKind::MemberAccess),
            _ => None,
        };
        if let Some(kind) = reserved {
            let t = Token::new(kind, self.slice(self.pos, self.pos + 1));
            self.pos += 1;
            return Some(t);
        }
        self.scan_substream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BinaryOps, Definition, UnaryOps};
    use crate::value::{Value, ValueType};

    fn test_registry() -> Registry {
        let mut reg = Registry::new();
        for (sym, prec) in [("+", 3), ("-", 3), ("*", 2), ("<", 4), ("<=", 4)] {
            reg.insert(
                Definition::new(sym)
                    .with_binary(BinaryOps::new(prec).generic(ValueType::Any, |_, _| {
                        Ok(Value::Int(0))
                    })),
            );
        }
        reg.insert(
            Definition::new("!").with_postfix(UnaryOps::new(1).generic(ValueType::Any, |v| {
                Ok(v.clone())
            })),
        );
        reg.insert(
            Definition::new("mod")
                .with_binary(BinaryOps::new(2).generic(ValueType::Any, |_, _| Ok(Value::Int(0)))),
        );
        reg
    }

    fn lex(src: &str) -> Vec<Token> {
        let cfg = ParseConfig::default();
        let reg = test_registry();
        Tokenizer::new(src, &cfg, &reg).collect()
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text()).collect()
    }

    #[test]
    fn covers_whole_input_with_no_gaps() {
        let toks = lex("2 + 3 * 4");
        assert_eq!(texts(&toks), ["2", "+", "3", "*", "4"]);
        // Positions are byte offsets into the original input.
        assert_eq!(toks[0].position(), 0);
        assert_eq!(toks[1].position(), 2);
        assert_eq!(toks[4].position(), 8);
    }

    #[test]
    fn fractional_and_scientific_numbers() {
        assert_eq!(texts(&lex("12.5")), ["12.5"]);
        assert_eq!(texts(&lex("1e5")), ["1e5"]);
        assert_eq!(texts(&lex("2.5E-2")), ["2.5E-2"]);
        assert_eq!(texts(&lex("1e+10")), ["1e+10"]);
    }

    #[test]
    fn malformed_trailing_point_backtracks() {
        let toks = lex("12.");
        assert_eq!(texts(&toks), ["12", "."]);
        assert_eq!(toks[1].kind, TokenKind::MemberAccess);
    }

    #[test]
    fn malformed_exponent_backtracks_to_last_digit() {
        // `1e+` with no digit after the sign: the number is just `1`.
        let toks = lex("1e+");
        assert_eq!(texts(&toks), ["1", "e", "+"]);
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[1].kind, TokenKind::Name);
        assert_eq!(toks[2].kind, TokenKind::Construct);
    }

    #[test]
    fn group_separator_only_between_digits() {
        let cfg = ParseConfig {
            group_separator: Some('_'),
            ..ParseConfig::default()
        };
        let reg = test_registry();
        let toks: Vec<Token> = Tokenizer::new("1_000 1_", &cfg, &reg).collect();
        assert_eq!(texts(&toks), ["1_000", "1", "_"]);
    }

    #[test]
    fn integers_only_mode_stops_at_punctuation() {
        let cfg = ParseConfig {
            allow_non_integer: false,
            ..ParseConfig::default()
        };
        let reg = test_registry();
        let toks: Vec<Token> = Tokenizer::new("1.5", &cfg, &reg).collect();
        assert_eq!(texts(&toks), ["1", ".", "5"]);
    }

    #[test]
    fn string_with_doubled_delimiter() {
        let toks = lex(r#""ab""cd""#);
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Str { terminated: true });
        assert_eq!(toks[0].text(), r#""ab""cd""#);
    }

    #[test]
    fn unterminated_string_is_shape_marked() {
        let toks = lex("\"abc");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Str { terminated: false });
    }

    #[test]
    fn substream_splits_identifier_and_symbols() {
        let toks = lex("a<=b");
        assert_eq!(texts(&toks), ["a", "<=", "b"]);
        assert_eq!(
            kinds(&toks),
            [TokenKind::Name, TokenKind::Construct, TokenKind::Name]
        );
    }

    #[test]
    fn longest_match_wins_over_shorter_prefix() {
        let toks = lex("x<=y");
        assert_eq!(texts(&toks), ["x", "<=", "y"]);
    }

    #[test]
    fn unmatched_leading_symbols_are_peeled() {
        // `=` alone is not registered; `<=` is. The leading `=` is peeled
        // and re-offered as plain text at its original position.
        let toks = lex("=<=");
        assert_eq!(texts(&toks), ["=", "<="]);
        assert_eq!(kinds(&toks), [TokenKind::Name, TokenKind::Construct]);
        assert_eq!(toks[0].position(), 0);
        assert_eq!(toks[1].position(), 1);
    }

    #[test]
    fn exhausted_symbol_run_is_plain_text() {
        let toks = lex("==");
        assert_eq!(texts(&toks), ["=="]);
        assert_eq!(toks[0].kind, TokenKind::Name);
    }

    #[test]
    fn digit_after_symbol_run_starts_a_number() {
        let toks = lex("x+1");
        assert_eq!(texts(&toks), ["x", "+", "1"]);
        assert_eq!(toks[2].kind, TokenKind::Number);
    }

    #[test]
    fn word_constructs_lex_from_identifier_runs() {
        let toks = lex("a mod b");
        assert_eq!(
            kinds(&toks),
            [TokenKind::Name, TokenKind::Construct, TokenKind::Name]
        );
    }

    #[test]
    fn booleans_and_postfix_adjacency() {
        let toks = lex("true x!");
        assert_eq!(texts(&toks), ["true", "x", "!"]);
        assert_eq!(toks[0].kind, TokenKind::Bool);
        assert_eq!(toks[2].kind, TokenKind::Construct);
    }

    #[test]
    fn reserved_chars_bound_substreams() {
        let toks = lex("f(x,y)");
        assert_eq!(texts(&toks), ["f", "(", "x", ",", "y", ")"]);
    }
}
