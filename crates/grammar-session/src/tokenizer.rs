//! The tokenizer oracle contract and a small byte/word-level toy
//! implementation used by the test suite, the benchmarks, and the
//! `grammar-check` CLI's `drive` subcommand.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::TokenId;

/// The id↔string contract a host must provide. The matcher never needs
/// anything else from the model's tokenizer: no merges, no byte-fallback
/// rules, no special-token handling beyond a single `eos_id`.
pub trait TokenizerOracle {
    /// Number of ids in `[0, vocab_size)`.
    fn vocab_size(&self) -> usize;
    /// The distinguished end-of-stream id.
    fn eos_id(&self) -> TokenId;
    /// Decode a single id to the piece of text it spells.
    fn decode(&self, id: TokenId) -> String;
    /// Encode a whole string into the id sequence that spells it, using
    /// whatever tokenization policy the host's model uses. Used by tests
    /// exercising the round-trip property, and by `grammar-check drive`.
    fn encode(&self, text: &str) -> Vec<TokenId>;
}

/// The process-wide decode cache keyed by tokenizer identity, described in
/// the concurrency section of the design doc: every `Arc<dyn
/// TokenizerOracle>` is identified by its pointer, and the first `decode`
/// of a given id under a given tokenizer is memoized for the life of the
/// process.
type DecodeCache = Mutex<HashMap<(usize, TokenId), String>>;

fn decode_cache() -> &'static DecodeCache {
    static CACHE: OnceLock<DecodeCache> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

/// Decode `id` through `tokenizer`, consulting (and populating) the
/// process-wide cache keyed by `identity` (the tokenizer's `Arc` pointer,
/// cast to a `usize` by the caller).
pub(crate) fn cached_decode(identity: usize, id: TokenId, tokenizer: &dyn TokenizerOracle) -> String {
    let mut cache = decode_cache().lock().unwrap();
    cache
        .entry((identity, id))
        .or_insert_with(|| tokenizer.decode(id))
        .clone()
}

/// Drop every entry belonging to `identity`. Called when a [`crate::Grammar`]
/// is given a different tokenizer, per the invalidation rule in the design
/// doc ("invalidated when the tokenizer changes").
pub(crate) fn invalidate(identity: usize) {
    decode_cache().lock().unwrap().retain(|(id, _), _| *id != identity);
}

/// A small configurable tokenizer for tests, benchmarks, and the CLI: id 0
/// is EOS, ids `1..=127` are the printable ASCII bytes, and any additional
/// multi-character `extra_tokens` are appended after that, mirroring the
/// "toy 127-id tokenizer with reserved multi-character ids" used throughout
/// the design doc's scenarios.
pub struct ByteTokenizer {
    pieces: Vec<String>,
}

impl ByteTokenizer {
    /// EOS-only plus the full ASCII byte range; no multi-character pieces.
    pub fn new() -> Self {
        ByteTokenizer::with_extra_tokens(Vec::new())
    }

    /// Like [`ByteTokenizer::new`], with additional multi-character tokens
    /// appended to the vocabulary after the single-byte ids.
    pub fn with_extra_tokens(extra_tokens: Vec<String>) -> Self {
        let mut pieces = Vec::with_capacity(128 + extra_tokens.len());
        pieces.push(String::new()); // id 0: EOS, decodes to empty string
        for byte in 1u8..=127 {
            pieces.push((byte as char).to_string());
        }
        pieces.extend(extra_tokens);
        ByteTokenizer { pieces }
    }

    pub fn token_id_for(&self, piece: &str) -> Option<TokenId> {
        self.pieces
            .iter()
            .position(|p| p == piece)
            .map(|idx| idx as TokenId)
    }
}

impl Default for ByteTokenizer {
    fn default() -> Self {
        ByteTokenizer::new()
    }
}

impl TokenizerOracle for ByteTokenizer {
    fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    fn eos_id(&self) -> TokenId {
        0
    }

    fn decode(&self, id: TokenId) -> String {
        self.pieces
            .get(id as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn encode(&self, text: &str) -> Vec<TokenId> {
        // Greedy longest-piece-first match, good enough for a toy oracle:
        // try every registered multi-character piece before falling back
        // to single bytes.
        let mut ids = Vec::new();
        let mut rest = text;
        'outer: while !rest.is_empty() {
            let mut candidates: Vec<(usize, TokenId)> = self
                .pieces
                .iter()
                .enumerate()
                .filter(|(id, piece)| *id != 0 && !piece.is_empty() && rest.starts_with(piece.as_str()))
                .map(|(id, piece)| (piece.len(), id as TokenId))
                .collect();
            candidates.sort_by(|a, b| b.0.cmp(&a.0));
            if let Some((len, id)) = candidates.first().copied() {
                ids.push(id);
                rest = &rest[len..];
                continue 'outer;
            }
            // No registered piece matches (non-ASCII or empty vocab slot);
            // this toy tokenizer can't represent it.
            break;
        }
        ids
    }
}
