//! Resolution result models. Transient: never persisted.

use crate::catalog::FoodHit;

/// A scored catalog match for one query.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub food: FoodHit,
    /// Composite of catalog relevance and text similarity, in `[0, 1]`
    pub score: f64,
    /// The text-similarity sub-score on its own
    pub similarity: f64,
}

/// All candidates for one query, best first.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub candidates: Vec<SearchCandidate>,
}

impl Resolution {
    /// The best-scoring candidate, if any tier matched.
    pub fn best(&self) -> Option<&SearchCandidate> {
        self.candidates.first()
    }
}
