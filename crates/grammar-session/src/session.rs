//! The decoding session: a parsed grammar plus a live matcher-tree cursor,
//! wired to a host-supplied tokenizer oracle.

use std::sync::Arc;

use grammar_parser::Grammar as ParsedGrammar;

use crate::cache::MatcherCaches;
use crate::error::{GenerationError, SessionError};
use crate::matcher::{enter, MatchContext, MatcherBox, Step};
use crate::tokenizer::{invalidate, TokenizerOracle};
use crate::TokenId;

/// A grammar-constrained decoding session.
///
/// Construct one per generation, call [`Grammar::mask_scores`] before every
/// sampling step, and [`Grammar::advance`] after a token is sampled. The
/// session is single-threaded: share it across threads behind your own
/// lock if a host needs that, the way [`crate::tokenizer::TokenizerOracle`]
/// implementations are expected to be `Send + Sync` but this type is not.
pub struct Grammar {
    parsed: ParsedGrammar,
    tokenizer: Arc<dyn TokenizerOracle>,
    tokenizer_identity: usize,
    caches: MatcherCaches,
    active: Option<MatcherBox>,
}

fn tokenizer_identity(tokenizer: &Arc<dyn TokenizerOracle>) -> usize {
    Arc::as_ptr(tokenizer) as *const () as usize
}

impl Grammar {
    /// Parse `source` and start a session at its `root` rule.
    pub fn new(source: &str, tokenizer: Arc<dyn TokenizerOracle>) -> Result<Grammar, SessionError> {
        let parsed = ParsedGrammar::parse(source)?;
        let tokenizer_identity = tokenizer_identity(&tokenizer);
        let mut session = Grammar {
            parsed,
            tokenizer,
            tokenizer_identity,
            caches: MatcherCaches::default(),
            active: None,
        };
        session.reset();
        Ok(session)
    }

    /// Rewind the cursor back to `root`, discarding everything advanced so
    /// far. The vocabulary caches are kept: they depend only on the grammar
    /// text and the tokenizer, neither of which changed.
    pub fn reset(&mut self) {
        let matcher = {
            let ctx = self.context();
            let root = self.parsed.root();
            enter(&ctx, root)
        };
        self.active = Some(matcher);
    }

    /// Jump the cursor directly to `name`, bypassing `root`. Used to drive a
    /// sub-grammar in isolation, e.g. validating one rule's productions
    /// without re-deriving the whole document from the top.
    pub fn enter_rule(&mut self, name: &str) -> Result<(), SessionError> {
        let symbol = self
            .parsed
            .resolve(name)
            .ok_or_else(|| SessionError::UnknownRule { name: name.to_string() })?;
        let matcher = {
            let ctx = self.context();
            enter(&ctx, &symbol)
        };
        self.active = Some(matcher);
        Ok(())
    }

    /// Replace the tokenizer mid-session. Invalidates both the process-wide
    /// decode cache entries for the old tokenizer and this session's own
    /// vocabulary caches, which were computed against the old vocabulary.
    pub fn set_tokenizer(&mut self, tokenizer: Arc<dyn TokenizerOracle>) {
        invalidate(self.tokenizer_identity);
        self.tokenizer_identity = tokenizer_identity(&tokenizer);
        self.tokenizer = tokenizer;
        self.caches = MatcherCaches::default();
    }

    /// `true` once the grammar has reached a position with nothing left to
    /// match; only EOS remains permitted from here on.
    pub fn is_finished(&self) -> bool {
        self.active.is_none()
    }

    /// Set every id `scores` disallows at the current cursor position to
    /// `-infinity`, in place. `scores[i]` must be the raw logit for
    /// vocabulary id `i`.
    pub fn mask_scores(&self, scores: &mut [f32]) {
        let eos_id = self.tokenizer.eos_id();
        match &self.active {
            Some(matcher) => {
                let ctx = self.context();
                let mut allowed = matcher.allowed_tokens(&ctx);
                // `look_ahead` from the root means the position is itself
                // nullable, which is exactly when EOS should be on the table.
                allowed.allow_eos |= allowed.look_ahead;
                allowed.apply(scores, eos_id);
            }
            None => {
                for (id, score) in scores.iter_mut().enumerate() {
                    if id as TokenId != eos_id {
                        *score = f32::NEG_INFINITY;
                    }
                }
            }
        }
    }

    /// Feed a sampled token id to the cursor. Returns
    /// [`GenerationError`] if the host sampled something `mask_scores`
    /// had already ruled out; the session survives such a call by going
    /// EOS-only, so the caller can choose to truncate and move on rather
    /// than abort the whole generation.
    pub fn advance(&mut self, token: TokenId) -> Result<(), GenerationError> {
        let eos_id = self.tokenizer.eos_id();
        if token == eos_id {
            let nullable = match &self.active {
                None => true,
                Some(matcher) => {
                    let ctx = MatchContext {
                        grammar: &self.parsed,
                        tokenizer: self.tokenizer.as_ref(),
                        tokenizer_identity: self.tokenizer_identity,
                        caches: &self.caches,
                    };
                    let allowed = matcher.allowed_tokens(&ctx);
                    allowed.allow_eos || allowed.look_ahead
                }
            };
            self.active = None;
            return if nullable {
                Ok(())
            } else {
                log::warn!("end-of-stream sampled while the grammar was not yet nullable");
                Err(GenerationError::PrematureEos)
            };
        }

        // Take the active matcher out of `self` so the `MatchContext` below
        // (which borrows the rest of `self`) and the `&mut` advance call
        // don't both need to see through a live borrow of the same field.
        let Some(mut matcher) = self.active.take() else {
            log::warn!("token {token} sampled after the grammar session had already finished");
            return Err(GenerationError::RejectedToken { token_id: token });
        };
        let ctx = MatchContext {
            grammar: &self.parsed,
            tokenizer: self.tokenizer.as_ref(),
            tokenizer_identity: self.tokenizer_identity,
            caches: &self.caches,
        };
        let step = matcher.advance(&ctx, token);
        match step {
            Step::Again => {
                self.active = Some(matcher);
                Ok(())
            }
            Step::Done => Ok(()),
            Step::Reject | Step::TryNext => {
                log::warn!("token {token} was rejected by the grammar at the current cursor position");
                Err(GenerationError::RejectedToken { token_id: token })
            }
        }
    }

    fn context(&self) -> MatchContext {
        MatchContext {
            grammar: &self.parsed,
            tokenizer: self.tokenizer.as_ref(),
            tokenizer_identity: self.tokenizer_identity,
            caches: &self.caches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ByteTokenizer;
    use std::sync::Arc;

    fn session(source: &str) -> Grammar {
        Grammar::new(source, Arc::new(ByteTokenizer::new())).unwrap()
    }

    #[test]
    fn accepts_a_matching_literal() {
        let mut g = session("root ::= \"ok\"\n");
        let tok = ByteTokenizer::new();
        for id in tok.encode("ok") {
            g.advance(id).unwrap();
        }
        assert!(g.is_finished());
    }

    #[test]
    fn rejects_a_token_outside_the_grammar() {
        let mut g = session("root ::= \"ok\"\n");
        let tok = ByteTokenizer::new();
        let bad = tok.token_id_for("x").unwrap();
        assert!(g.advance(bad).is_err());
        assert!(g.is_finished());
    }

    #[test]
    fn mask_scores_bans_eos_before_root_is_nullable() {
        let g = session("root ::= \"ok\"\n");
        let tok = ByteTokenizer::new();
        let mut scores = vec![0.0_f32; tok.vocab_size()];
        g.mask_scores(&mut scores);
        assert_eq!(scores[tok.eos_id() as usize], f32::NEG_INFINITY);
    }

    #[test]
    fn mask_scores_allows_only_eos_once_finished() {
        let mut g = session("root ::= \"ok\"\n");
        let tok = ByteTokenizer::new();
        for id in tok.encode("ok") {
            g.advance(id).unwrap();
        }
        let mut scores = vec![0.0_f32; tok.vocab_size()];
        g.mask_scores(&mut scores);
        assert_eq!(scores[tok.eos_id() as usize], 0.0);
        assert_eq!(scores[tok.token_id_for("o").unwrap() as usize], f32::NEG_INFINITY);
    }

    #[test]
    fn premature_eos_is_reported_and_then_sticky() {
        let mut g = session("root ::= \"ok\"\n");
        assert_eq!(g.advance(0), Err(GenerationError::PrematureEos));
        assert!(g.is_finished());
    }

    #[test]
    fn enter_rule_jumps_the_cursor() {
        let mut g = session("root ::= \"ok\"\nalt ::= \"hi\"\n");
        g.enter_rule("alt").unwrap();
        let tok = ByteTokenizer::new();
        for id in tok.encode("hi") {
            g.advance(id).unwrap();
        }
        assert!(g.is_finished());
    }

    #[test]
    fn enter_rule_rejects_an_unknown_name() {
        let mut g = session("root ::= \"ok\"\n");
        assert!(matches!(g.enter_rule("nope"), Err(SessionError::UnknownRule { .. })));
    }
}
