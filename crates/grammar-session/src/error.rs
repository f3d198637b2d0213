use thiserror::Error;

/// Returned by [`crate::Grammar::new`], [`crate::Grammar::reset`], and
/// [`crate::Grammar::enter_rule`]. The `Parse` variant is unrecoverable: no
/// session is created. `UnknownRule` leaves an existing session untouched.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] grammar_parser::ParseError),
    #[error("no rule named {name:?} in this grammar")]
    UnknownRule { name: String },
}

/// A runtime reconciliation failure: the host sampled a token that
/// `mask_scores` had already set to `-infinity`, or it sampled EOS while the
/// grammar was not yet at a nullable position.
///
/// This is never fatal to the process. [`crate::Grammar::advance`] logs a
/// `log::warn!` at the point it's raised, clears the active matcher, and the
/// session becomes EOS-only from then on; it does not rewrite any token
/// already emitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("sampled token {token_id} was not permitted by the last mask_scores() call")]
    RejectedToken { token_id: crate::TokenId },
    #[error("end-of-stream was sampled while the grammar was not yet nullable")]
    PrematureEos,
}
