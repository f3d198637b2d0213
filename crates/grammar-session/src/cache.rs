//! Vocabulary-dependent caches: which ids are consistent with a given
//! terminal prefix, and which ids are consistent with a given character
//! class. Both require scanning the whole vocabulary the first time a
//! (symbol, context) pair is seen, so memoizing them is what keeps
//! `mask_scores` fast on anything but the first step through a symbol.
//!
//! Conceptually these caches "live on the symbol nodes", per the design
//! doc; in practice that means keying by the symbol's `Rc` pointer identity
//! here in the session crate rather than storing them as fields on
//! `grammar_parser::Symbol`, which has no notion of a tokenizer. See
//! DESIGN.md for the rationale.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use grammar_parser::{CharClass, Symbol};

use crate::allowed_set::AllowedSet;
use crate::tokenizer::{cached_decode, TokenizerOracle};
use crate::TokenId;

#[derive(Default)]
pub(crate) struct MatcherCaches {
    /// Keyed by (terminal symbol pointer, byte index into the terminal).
    terminal_prefix: RefCell<HashMap<(usize, usize), Rc<AllowedSet>>>,
    /// Keyed by (regexp symbol pointer, whether it's matching a run).
    regexp: RefCell<HashMap<(usize, bool), Rc<AllowedSet>>>,
}

fn ptr_key(symbol: &Rc<Symbol>) -> usize {
    Rc::as_ptr(symbol) as usize
}

impl MatcherCaches {
    /// All ids whose decoded string is a non-empty prefix of
    /// `value[index..]`. EOS is never a member: its decoded string is
    /// empty, and the empty string is not a *non-empty* prefix of anything.
    pub(crate) fn terminal_allowed(
        &self,
        symbol: &Rc<Symbol>,
        value: &str,
        index: usize,
        tokenizer_identity: usize,
        tokenizer: &dyn TokenizerOracle,
    ) -> Rc<AllowedSet> {
        let key = (ptr_key(symbol), index);
        if let Some(cached) = self.terminal_prefix.borrow().get(&key) {
            return cached.clone();
        }
        let remaining = &value[index..];
        let mut allowed = HashSet::new();
        for id in 0..tokenizer.vocab_size() as TokenId {
            if id == tokenizer.eos_id() {
                continue;
            }
            let piece = cached_decode(tokenizer_identity, id, tokenizer);
            if !piece.is_empty() && remaining.starts_with(piece.as_str()) {
                allowed.insert(id);
            }
        }
        let result = Rc::new(AllowedSet::positive(allowed));
        self.terminal_prefix.borrow_mut().insert(key, result.clone());
        result
    }

    /// The allowed/banned set for a `RegExp` symbol. `run` selects whether
    /// a decoded string must be exactly one codepoint (`run = false`,
    /// standalone occurrence) or one-or-more codepoints, all satisfying the
    /// class (`run = true`, direct child of a `Repeat`).
    pub(crate) fn regexp_allowed(
        &self,
        symbol: &Rc<Symbol>,
        class: &CharClass,
        run: bool,
        next_terminal: Option<&str>,
        tokenizer_identity: usize,
        tokenizer: &dyn TokenizerOracle,
    ) -> Rc<AllowedSet> {
        let key = (ptr_key(symbol), run);
        if let Some(cached) = self.regexp.borrow().get(&key) {
            return cached.clone();
        }
        let result = if class.negative {
            Rc::new(AllowedSet::negative(banned_ids(
                class,
                run,
                next_terminal,
                tokenizer_identity,
                tokenizer,
            )))
        } else {
            Rc::new(AllowedSet::positive(positive_ids(
                class,
                run,
                tokenizer_identity,
                tokenizer,
            )))
        };
        self.regexp.borrow_mut().insert(key, result.clone());
        result
    }
}

fn matches_run(class: &CharClass, run: bool, decoded: &str) -> bool {
    if decoded.is_empty() {
        return false;
    }
    if !run && decoded.chars().count() != 1 {
        return false;
    }
    decoded.chars().all(|c| class.matches(c))
}

fn positive_ids(
    class: &CharClass,
    run: bool,
    tokenizer_identity: usize,
    tokenizer: &dyn TokenizerOracle,
) -> HashSet<TokenId> {
    let mut allowed = HashSet::new();
    for id in 0..tokenizer.vocab_size() as TokenId {
        if id == tokenizer.eos_id() {
            continue;
        }
        let piece = cached_decode(tokenizer_identity, id, tokenizer);
        if matches_run(class, run, &piece) {
            allowed.insert(id);
        }
    }
    allowed
}

/// `class` here is a *negative* class (`[^...]`): a token is banned when its
/// decoded string contains a forbidden codepoint, unless that codepoint
/// only occurs in a tail which is itself a prefix of `next_terminal` and
/// the rest of the token is legal — see the design doc's note on negative
/// regexps with a successor terminal.
fn banned_ids(
    class: &CharClass,
    _run: bool,
    next_terminal: Option<&str>,
    tokenizer_identity: usize,
    tokenizer: &dyn TokenizerOracle,
) -> HashSet<TokenId> {
    // A negative class bans by scanning the whole decoded string for a
    // forbidden character, with no single-codepoint/run distinction:
    // `_run` only matters to `positive_ids`, where it gates whether
    // multi-character tokens can satisfy an enumerated class at all.
    let mut banned = HashSet::new();
    for id in 0..tokenizer.vocab_size() as TokenId {
        if id == tokenizer.eos_id() {
            continue;
        }
        let piece = cached_decode(tokenizer_identity, id, tokenizer);
        if piece.is_empty() {
            continue;
        }
        if is_banned(class, &piece, next_terminal) {
            banned.insert(id);
        }
    }
    banned
}

fn is_banned(class: &CharClass, piece: &str, next_terminal: Option<&str>) -> bool {
    let chars: Vec<char> = piece.chars().collect();
    let Some(first_bad) = chars.iter().position(|&c| !class.matches(c)) else {
        return false;
    };
    let Some(next_terminal) = next_terminal else {
        return true;
    };
    // The head up to `first_bad` must be entirely legal, and everything
    // from `first_bad` onward must be a prefix of `next_terminal`.
    if chars[..first_bad].iter().any(|&c| !class.matches(c)) {
        return true;
    }
    let tail: String = chars[first_bad..].iter().collect();
    !next_terminal.starts_with(&tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grammar_parser::Grammar;

    struct FakeTokenizer {
        pieces: Vec<&'static str>,
    }

    impl TokenizerOracle for FakeTokenizer {
        fn vocab_size(&self) -> usize {
            self.pieces.len()
        }
        fn eos_id(&self) -> TokenId {
            0
        }
        fn decode(&self, id: TokenId) -> String {
            self.pieces[id as usize].to_string()
        }
        fn encode(&self, _text: &str) -> Vec<TokenId> {
            Vec::new()
        }
    }

    #[test]
    fn tail_exception_lets_boundary_token_through() {
        // [^"]+ "..." : the token `."` should not be banned because its
        // only forbidden char (`"`) is a tail that is a prefix of the next
        // terminal `"...`, and the head `.` is legal.
        let class = CharClass::parse_body("\"", true, "[^\"]".into());
        let tokenizer = FakeTokenizer {
            pieces: vec!["", "a", ".\"", "\"x"],
        };
        let caches = MatcherCaches::default();
        let grammar = Grammar::parse("root ::= [^\"]\n").unwrap();
        let symbol = grammar.resolve("root").unwrap();
        let set = caches.regexp_allowed(&symbol, &class, false, Some("\"..."), 0, &tokenizer);
        assert!(!set.banned.contains(&2)); // `."`  -> allowed
        assert!(set.banned.contains(&3)); // `"x` -> head already forbidden
    }
}
