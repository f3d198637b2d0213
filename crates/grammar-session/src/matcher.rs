//! The mutable traversal state over an immutable [`grammar_parser::Symbol`]
//! tree: one matcher variant per symbol variant, each able to report
//! [`AllowedSet`] for the current cursor position and to advance that
//! cursor on a sampled token id.

use std::rc::Rc;

use grammar_parser::{Grammar as SymbolGrammar, RepeatMode, Symbol};

use crate::allowed_set::AllowedSet;
use crate::cache::MatcherCaches;
use crate::tokenizer::{cached_decode, TokenizerOracle};
use crate::TokenId;

/// Everything a matcher needs to answer `allowed_tokens`/`advance`, bundled
/// so call sites don't have to thread four separate arguments everywhere.
pub(crate) struct MatchContext<'a> {
    pub grammar: &'a SymbolGrammar,
    pub tokenizer: &'a dyn TokenizerOracle,
    pub tokenizer_identity: usize,
    pub caches: &'a MatcherCaches,
}

impl<'a> MatchContext<'a> {
    fn decode(&self, id: TokenId) -> String {
        cached_decode(self.tokenizer_identity, id, self.tokenizer)
    }
}

/// The result of feeding one sampled token id to a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Token consumed; this matcher wants more tokens.
    Again,
    /// Token consumed; this matcher is finished.
    Done,
    /// Token refused; fatal unless the parent treats it as optional.
    Reject,
    /// Token refused, but this matcher's continuation was optional here:
    /// the parent should treat it as finished *without* consuming the
    /// token, and retry the token on whatever comes next.
    TryNext,
}

pub(crate) trait Matcher {
    fn allowed_tokens(&self, ctx: &MatchContext) -> AllowedSet;
    fn advance(&mut self, ctx: &MatchContext, token: TokenId) -> Step;
}

pub(crate) type MatcherBox = Box<dyn Matcher>;

/// Follow `NonTerminal` references until landing on a symbol with its own
/// matcher variant. Safe against infinite loops because `Grammar::parse`
/// rejects degenerate alias cycles.
fn resolve(ctx: &MatchContext, symbol: &Rc<Symbol>) -> Rc<Symbol> {
    let mut current = symbol.clone();
    loop {
        match &*current {
            Symbol::NonTerminal(name) => {
                current = ctx
                    .grammar
                    .resolve(name)
                    .expect("validated grammar: every NonTerminal resolves");
            }
            _ => return current,
        }
    }
}

/// Build the matcher for `symbol`, resolving `NonTerminal` transparently —
/// there is no separate matcher variant for it, per the design doc.
pub(crate) fn enter(ctx: &MatchContext, symbol: &Rc<Symbol>) -> MatcherBox {
    let resolved = resolve(ctx, symbol);
    match &*resolved {
        Symbol::Terminal(value) => Box::new(TerminalMatcher::new(resolved.clone(), value.clone())),
        Symbol::RegExp { .. } => Box::new(RegExpMatcher::new(resolved.clone(), false)),
        Symbol::AnyToken => Box::new(AnyTokenMatcher),
        Symbol::Sequence(children) => Box::new(SequenceMatcher::new(resolved.clone(), children.clone())),
        Symbol::Alternative(children) => Box::new(AlternativeMatcher::new(ctx, children.clone())),
        Symbol::Repeat(mode, inner) => Box::new(RepeatMatcher::new(ctx, *mode, inner.clone())),
        Symbol::NonTerminal(_) => unreachable!("resolve() always strips NonTerminal"),
    }
}

/// Like [`enter`], but used for the direct child of a `Repeat`: if that
/// child is (or resolves to) a `RegExp`, it matches a run of one-or-more
/// codepoints instead of exactly one, per §4.E.2.
fn enter_repeat_inner(ctx: &MatchContext, symbol: &Rc<Symbol>) -> MatcherBox {
    let resolved = resolve(ctx, symbol);
    match &*resolved {
        Symbol::RegExp { .. } => Box::new(RegExpMatcher::new(resolved.clone(), true)),
        _ => enter(ctx, &resolved),
    }
}

/// Enter `children[index]` as a `Sequence` child, recognizing the `A+`
/// desugar (`Sequence(A, Repeat(Star, A))`, sharing one `Rc` for both `A`
/// occurrences) so the mandatory first copy of a repeated `RegExp` also
/// matches a run, not just one codepoint: a model that emits `"\n\n"` as a
/// single token should satisfy `[\n]+` on its very first token.
fn enter_sequence_child(ctx: &MatchContext, children: &[Rc<Symbol>], index: usize) -> MatcherBox {
    let symbol = &children[index];
    if let Symbol::RegExp { .. } = &**symbol {
        if let Some(next) = children.get(index + 1) {
            if let Symbol::Repeat(RepeatMode::Star, inner) = &**next {
                if Rc::ptr_eq(symbol, inner) {
                    return Box::new(RegExpMatcher::new(symbol.clone(), true));
                }
            }
        }
    }
    enter(ctx, symbol)
}

// ---------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------

pub(crate) struct TerminalMatcher {
    symbol: Rc<Symbol>,
    value: String,
    index: usize,
}

impl TerminalMatcher {
    fn new(symbol: Rc<Symbol>, value: String) -> Self {
        TerminalMatcher {
            symbol,
            value,
            index: 0,
        }
    }
}

impl Matcher for TerminalMatcher {
    fn allowed_tokens(&self, ctx: &MatchContext) -> AllowedSet {
        (*ctx.caches.terminal_allowed(
            &self.symbol,
            &self.value,
            self.index,
            ctx.tokenizer_identity,
            ctx.tokenizer,
        ))
        .clone()
    }

    fn advance(&mut self, ctx: &MatchContext, token: TokenId) -> Step {
        let piece = ctx.decode(token);
        if piece.is_empty() {
            return Step::Reject;
        }
        if self.value[self.index..].starts_with(piece.as_str()) {
            self.index += piece.len();
            return if self.index == self.value.len() {
                Step::Done
            } else {
                Step::Again
            };
        }
        if self.index == 0 {
            // Mid-terminal entry: the model may have already half-emitted
            // this terminal in an earlier context. Find the longest
            // non-empty suffix of the token that is a prefix of `value`.
            for start in piece.char_indices().map(|(i, _)| i) {
                let suffix = &piece[start..];
                if self.value.starts_with(suffix) {
                    self.index = suffix.len();
                    return if self.index == self.value.len() {
                        Step::Done
                    } else {
                        Step::Again
                    };
                }
            }
        }
        Step::Reject
    }
}

// ---------------------------------------------------------------------
// RegExp
// ---------------------------------------------------------------------

pub(crate) struct RegExpMatcher {
    symbol: Rc<Symbol>,
    /// Whether this instance matches a run of one-or-more codepoints
    /// (direct child of a `Repeat`) or exactly one (standalone).
    run: bool,
}

impl RegExpMatcher {
    fn new(symbol: Rc<Symbol>, run: bool) -> Self {
        RegExpMatcher { symbol, run }
    }

    fn class(&self) -> &grammar_parser::CharClass {
        match &*self.symbol {
            Symbol::RegExp { class, .. } => class,
            _ => unreachable!("RegExpMatcher always wraps Symbol::RegExp"),
        }
    }

    fn next_terminal(&self) -> Option<Rc<Symbol>> {
        self.symbol.regexp_next()
    }
}

impl Matcher for RegExpMatcher {
    fn allowed_tokens(&self, ctx: &MatchContext) -> AllowedSet {
        let next_owned = self.next_terminal();
        let next_str = next_owned.as_deref().and_then(|s| match s {
            Symbol::Terminal(v) => Some(v.as_str()),
            _ => None,
        });
        (*ctx.caches.regexp_allowed(
            &self.symbol,
            self.class(),
            self.run,
            next_str,
            ctx.tokenizer_identity,
            ctx.tokenizer,
        ))
        .clone()
    }

    fn advance(&mut self, ctx: &MatchContext, token: TokenId) -> Step {
        let allowed = self.allowed_tokens(ctx);
        if allowed.permits(token) {
            Step::Done
        } else {
            Step::Reject
        }
    }
}

// ---------------------------------------------------------------------
// AnyToken
// ---------------------------------------------------------------------

pub(crate) struct AnyTokenMatcher;

impl Matcher for AnyTokenMatcher {
    fn allowed_tokens(&self, _ctx: &MatchContext) -> AllowedSet {
        AllowedSet {
            allow_eos: true,
            ..AllowedSet::allow_all()
        }
    }

    fn advance(&mut self, _ctx: &MatchContext, _token: TokenId) -> Step {
        Step::Again
    }
}

// ---------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------

pub(crate) struct SequenceMatcher {
    children: Vec<Rc<Symbol>>,
    index: usize,
    current: Option<MatcherBox>,
}

impl SequenceMatcher {
    fn new(_symbol: Rc<Symbol>, children: Vec<Rc<Symbol>>) -> Self {
        SequenceMatcher {
            children,
            index: 0,
            current: None,
        }
    }

    fn materialize(&mut self, ctx: &MatchContext) {
        if self.current.is_none() {
            self.current = Some(enter_sequence_child(ctx, &self.children, self.index));
        }
    }
}

impl Matcher for SequenceMatcher {
    fn allowed_tokens(&self, ctx: &MatchContext) -> AllowedSet {
        // `allowed_tokens` is documented as pure/cache-populating, so we
        // materialize a throwaway current matcher rather than require
        // `&mut self` here; this only matters before the first `advance`.
        let current: MatcherBox = match &self.current {
            Some(m) => return self.allowed_tokens_from(ctx, m.as_ref()),
            None => enter_sequence_child(ctx, &self.children, self.index),
        };
        self.allowed_tokens_from(ctx, current.as_ref())
    }

    fn advance(&mut self, ctx: &MatchContext, token: TokenId) -> Step {
        self.materialize(ctx);
        loop {
            let step = self.current.as_mut().unwrap().advance(ctx, token);
            match step {
                Step::Again => return Step::Again,
                Step::Done => {
                    self.index += 1;
                    if self.index >= self.children.len() {
                        self.current = None;
                        return Step::Done;
                    }
                    self.current = Some(enter_sequence_child(ctx, &self.children, self.index));
                    return Step::Again;
                }
                Step::TryNext => {
                    self.index += 1;
                    if self.index >= self.children.len() {
                        self.current = None;
                        return Step::TryNext;
                    }
                    self.current = Some(enter_sequence_child(ctx, &self.children, self.index));
                    continue;
                }
                Step::Reject => return Step::Reject,
            }
        }
    }
}

impl SequenceMatcher {
    fn allowed_tokens_from(&self, ctx: &MatchContext, current: &dyn Matcher) -> AllowedSet {
        let mut combined = current.allowed_tokens(ctx);
        let mut chain_look_ahead = combined.look_ahead;
        let mut idx = self.index;
        while chain_look_ahead {
            idx += 1;
            if idx >= self.children.len() {
                break;
            }
            let sibling = enter_sequence_child(ctx, &self.children, idx);
            let sibling_allowed = sibling.allowed_tokens(ctx);
            chain_look_ahead = sibling_allowed.look_ahead;
            combined = combined.combine(sibling_allowed);
            combined.look_ahead = chain_look_ahead;
        }
        combined
    }
}

// ---------------------------------------------------------------------
// Alternative
// ---------------------------------------------------------------------

pub(crate) struct AlternativeMatcher {
    live: Vec<MatcherBox>,
}

impl AlternativeMatcher {
    fn new(ctx: &MatchContext, children: Vec<Rc<Symbol>>) -> Self {
        AlternativeMatcher {
            live: children.iter().map(|c| enter(ctx, c)).collect(),
        }
    }
}

impl Matcher for AlternativeMatcher {
    fn allowed_tokens(&self, ctx: &MatchContext) -> AllowedSet {
        let mut iter = self.live.iter();
        let Some(first) = iter.next() else {
            return AllowedSet::allow_all();
        };
        iter.fold(first.allowed_tokens(ctx), |acc, m| acc.combine(m.allowed_tokens(ctx)))
    }

    fn advance(&mut self, ctx: &MatchContext, token: TokenId) -> Step {
        let results: Vec<(MatcherBox, Step)> = std::mem::take(&mut self.live)
            .into_iter()
            .map(|mut m| {
                let step = m.advance(ctx, token);
                (m, step)
            })
            .collect();

        // Done wins: discard every sibling the instant one branch completes,
        // resolving the Alternative's race deterministically.
        if results.iter().any(|(_, step)| *step == Step::Done) {
            return Step::Done;
        }

        let mut saw_again = false;
        let mut saw_try_next = false;
        for (m, step) in results {
            match step {
                Step::Again => {
                    saw_again = true;
                    self.live.push(m);
                }
                Step::TryNext => saw_try_next = true,
                Step::Reject => {}
                Step::Done => unreachable!("handled above"),
            }
        }

        if saw_again {
            Step::Again
        } else if saw_try_next {
            Step::TryNext
        } else {
            Step::Reject
        }
    }
}

// ---------------------------------------------------------------------
// Repeat
// ---------------------------------------------------------------------

pub(crate) struct RepeatMatcher {
    mode: RepeatMode,
    inner_symbol: Rc<Symbol>,
    inner: MatcherBox,
    inside: bool,
}

impl RepeatMatcher {
    fn new(ctx: &MatchContext, mode: RepeatMode, inner_symbol: Rc<Symbol>) -> Self {
        RepeatMatcher {
            inner: enter_repeat_inner(ctx, &inner_symbol),
            mode,
            inner_symbol,
            inside: false,
        }
    }
}

impl Matcher for RepeatMatcher {
    fn allowed_tokens(&self, ctx: &MatchContext) -> AllowedSet {
        let mut result = self.inner.allowed_tokens(ctx);
        if !self.inside {
            result.look_ahead = true;
        }
        result
    }

    fn advance(&mut self, ctx: &MatchContext, token: TokenId) -> Step {
        match self.inner.advance(ctx, token) {
            Step::Again => {
                self.inside = true;
                Step::Again
            }
            Step::Done => match self.mode {
                RepeatMode::Star => {
                    self.inner = enter_repeat_inner(ctx, &self.inner_symbol);
                    self.inside = false;
                    Step::Again
                }
                RepeatMode::Optional => Step::Done,
            },
            // TryNext from the inner matcher (e.g. a nullable Sequence) has
            // no sibling to retry against at this level; treat it the same
            // as an outright Reject once we're already inside an iteration,
            // or as "this repetition is legally zero-length" otherwise.
            Step::Reject | Step::TryNext => {
                if self.inside {
                    Step::Reject
                } else {
                    Step::TryNext
                }
            }
        }
    }
}
