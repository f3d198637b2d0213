use std::collections::HashSet;

use crate::TokenId;

/// Which vocabulary ids may be sampled next.
///
/// Exactly one of `allowed` / `banned` is ever non-empty at a time (the
/// invariant is upheld by construction, not checked at runtime — see
/// [`AllowedSet::combine`]). Both empty means "every id is currently
/// permitted", which is how [`crate::matcher::AnyTokenMatcher`] represents
/// `.*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedSet {
    pub allowed: HashSet<TokenId>,
    pub banned: HashSet<TokenId>,
    /// Set by a `Repeat` matcher at a position where it could legally stop:
    /// tells the parent `Sequence` to union in the following sibling's
    /// allowed set too.
    pub look_ahead: bool,
    pub allow_eos: bool,
}

impl AllowedSet {
    /// "Every id is permitted" (modulo `allow_eos`), the identity of
    /// [`AllowedSet::combine`].
    pub fn allow_all() -> AllowedSet {
        AllowedSet::default()
    }

    pub fn positive(allowed: HashSet<TokenId>) -> AllowedSet {
        AllowedSet {
            allowed,
            ..Default::default()
        }
    }

    pub fn negative(banned: HashSet<TokenId>) -> AllowedSet {
        AllowedSet {
            banned,
            ..Default::default()
        }
    }

    fn is_allow_all(&self) -> bool {
        self.allowed.is_empty() && self.banned.is_empty()
    }

    /// Merge two `AllowedSet`s the way an `Alternative` or a look-ahead
    /// union does: the result permits a token iff *either* side would have.
    pub fn combine(self, other: AllowedSet) -> AllowedSet {
        let look_ahead = self.look_ahead || other.look_ahead;
        let allow_eos = self.allow_eos || other.allow_eos;

        let body = if self.is_allow_all() || other.is_allow_all() {
            AllowedSet::allow_all()
        } else if !self.banned.is_empty() && !other.banned.is_empty() {
            // Both negative: only ids banned by both sides stay banned.
            AllowedSet::negative(self.banned.intersection(&other.banned).copied().collect())
        } else if self.banned.is_empty() && other.banned.is_empty() {
            // Both positive: union of what either side allows.
            AllowedSet::positive(self.allowed.union(&other.allowed).copied().collect())
        } else {
            // Mixed: whichever side is positive carves exceptions out of
            // the negative side's ban list.
            let (positive, negative) = if self.banned.is_empty() {
                (&self.allowed, &other.banned)
            } else {
                (&other.allowed, &self.banned)
            };
            AllowedSet::negative(negative.difference(positive).copied().collect())
        };

        AllowedSet {
            look_ahead,
            allow_eos,
            ..body
        }
    }

    /// `true` if `id` may currently be sampled, ignoring `allow_eos` (the
    /// caller is responsible for special-casing the eos id itself).
    pub fn permits(&self, id: TokenId) -> bool {
        if self.is_allow_all() {
            true
        } else if !self.allowed.is_empty() {
            self.allowed.contains(&id)
        } else {
            !self.banned.contains(&id)
        }
    }

    /// Set every disallowed entry of `scores` to `-infinity`, and do the
    /// same to `eos_id` unless `allow_eos` is set. `scores[i]` is the raw
    /// score for token id `i`.
    pub fn apply(&self, scores: &mut [f32], eos_id: TokenId) {
        for (id, score) in scores.iter_mut().enumerate() {
            let id = id as TokenId;
            if id == eos_id {
                continue;
            }
            if !self.permits(id) {
                *score = f32::NEG_INFINITY;
            }
        }
        if !self.allow_eos {
            if let Some(score) = scores.get_mut(eos_id as usize) {
                *score = f32::NEG_INFINITY;
            }
        }
    }
}
