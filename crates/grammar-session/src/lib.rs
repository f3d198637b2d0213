//! A token-level matcher and decoding session that constrains an
//! autoregressive language model's output to a context-free grammar.
//!
//! This crate is the mutable, tokenizer-aware half of the system described
//! in `grammar-parser`'s docs: it walks the immutable [`grammar_parser::Symbol`]
//! tree one sampled token at a time, and at every step can answer "which
//! vocabulary ids are still consistent with the grammar?" as an
//! [`AllowedSet`]. The [`Grammar`] type is the thing a host generation loop
//! actually holds onto.
//!
//! ```
//! use std::sync::Arc;
//! use grammar_session::{Grammar, TokenizerOracle};
//! use grammar_session::tokenizer::ByteTokenizer;
//!
//! let tokenizer = Arc::new(ByteTokenizer::new());
//! let vocab_size = tokenizer.vocab_size();
//! let mut grammar = Grammar::new("root ::= \"ok\"\n", tokenizer).unwrap();
//! let mut scores = vec![0.0_f32; vocab_size];
//! grammar.mask_scores(&mut scores);
//! ```

mod allowed_set;
mod cache;
mod error;
mod matcher;
mod session;
pub mod tokenizer;

pub use crate::allowed_set::AllowedSet;
pub use crate::error::{GenerationError, SessionError};
pub use crate::session::Grammar;
pub use crate::tokenizer::TokenizerOracle;

/// A vocabulary token id, as reported by a [`TokenizerOracle`].
pub type TokenId = u32;
