//! Food and measure resolution against the remote catalog.

mod measure;
mod model;
mod similarity;

pub use measure::{resolve_measure, MeasureMatch};
pub use model::{Resolution, SearchCandidate};
pub use similarity::similarity;

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{FoodTier, NutritionCatalog};
use crate::error::Result;
use crate::text::normalize;

/// Weight of the catalog-reported relevance in the composite score.
const RELEVANCE_WEIGHT: f64 = 0.45;
/// Weight of the query/name text similarity in the composite score.
const SIMILARITY_WEIGHT: f64 = 0.55;

/// Resolves free-text food names onto canonical catalog entries.
pub struct FoodResolver {
    catalog: Arc<dyn NutritionCatalog>,
}

impl FoodResolver {
    pub fn new(catalog: Arc<dyn NutritionCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolves `query` through the tiered catalog search.
    ///
    /// Tiers are queried in precedence order and the first tier that
    /// returns any candidate wins (short-circuit, not a merge): a
    /// user's own curated data deliberately beats a more literal
    /// generic match. An empty resolution means no tier matched.
    pub async fn resolve(&self, user_id: &str, query: &str) -> Result<Resolution> {
        let normalized_query = normalize(query);

        for tier in FoodTier::ORDERED {
            let hits = self.catalog.search(user_id, &normalized_query, tier).await?;
            if hits.is_empty() {
                continue;
            }

            let mut candidates: Vec<SearchCandidate> = hits
                .into_iter()
                .map(|hit| {
                    let text_score = similarity(&normalized_query, &normalize(&hit.name));
                    SearchCandidate {
                        score: RELEVANCE_WEIGHT * hit.relevance.clamp(0.0, 1.0)
                            + SIMILARITY_WEIGHT * text_score,
                        similarity: text_score,
                        food: hit,
                    }
                })
                .collect();

            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.food.tier.precedence().cmp(&b.food.tier.precedence()))
                    .then(a.food.name.cmp(&b.food.name))
            });

            debug!(
                user_id,
                query = %normalized_query,
                tier = ?tier,
                candidates = candidates.len(),
                "tiered search resolved"
            );

            return Ok(Resolution { candidates });
        }

        debug!(user_id, query = %normalized_query, "no tier produced candidates");
        Ok(Resolution { candidates: Vec::new() })
    }
}
