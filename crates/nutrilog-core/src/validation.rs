//! Validation orchestrator: runs the resolver over a draft's items and
//! aggregates the outcome as data, never as exceptions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::NutritionCatalog;
use crate::error::Result;
use crate::preference::AliasScan;
use crate::resolver::{resolve_measure, FoodResolver, Resolution};

use crate::parser::DraftItem;

/// A draft item resolved against the catalog, ready for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedItem {
    /// The item name as it appeared in the draft
    pub original_name: String,
    pub food_id: i64,
    pub food_name: String,
    pub quantity: f64,
    pub measure_id: i64,
    pub measure_name: String,
    pub grams_per_unit: f64,
    /// Quantity is raw grams, not a multiple of the measure weight
    pub raw_grams: bool,
    /// Resolved through a pre-parse alias instead of catalog search
    pub alias_resolved: bool,
}

impl ValidatedItem {
    /// Total grams this item contributes to the meal.
    pub fn total_grams(&self) -> f64 {
        if self.raw_grams {
            self.quantity
        } else {
            self.quantity * self.grams_per_unit
        }
    }
}

/// Outcome of validating a whole draft. Partial success is allowed:
/// unresolved names are surfaced for retry, resolved items proceed.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub validated: Vec<ValidatedItem>,
    pub not_found: Vec<String>,
    /// Alternatives per validated item, aligned by index, for the
    /// "pick a different match" flow.
    pub alternatives: Vec<Resolution>,
}

/// Runs food and measure resolution over all items of a draft.
pub struct Validator {
    catalog: Arc<dyn NutritionCatalog>,
    resolver: FoodResolver,
}

impl Validator {
    pub fn new(catalog: Arc<dyn NutritionCatalog>) -> Self {
        let resolver = FoodResolver::new(catalog.clone());
        Self { catalog, resolver }
    }

    pub fn resolver(&self) -> &FoodResolver {
        &self.resolver
    }

    /// Validates every draft item.
    ///
    /// Items already resolved by a pre-parse alias skip the tiered
    /// search and fetch their food directly by id. Items with zero
    /// candidates across every tier land in `not_found`.
    pub async fn validate_items(
        &self,
        user_id: &str,
        items: &[DraftItem],
        aliases: &AliasScan,
    ) -> Result<ValidationOutcome> {
        let mut outcome = ValidationOutcome::default();

        for item in items {
            let quantity = item.quantity.unwrap_or(1.0);

            if let Some(alias) = aliases.resolves(&item.name) {
                let foods = self.catalog.get_foods(user_id, &[alias.food_id]).await?;
                if let Some(food) = foods.into_iter().next() {
                    let matched = resolve_measure(item.unit.as_deref(), &food.measures);
                    outcome.validated.push(ValidatedItem {
                        original_name: item.name.clone(),
                        food_id: food.id,
                        food_name: food.name,
                        quantity,
                        measure_id: matched.measure.id,
                        measure_name: matched.measure.name,
                        grams_per_unit: matched.measure.grams,
                        raw_grams: matched.raw_grams,
                        alias_resolved: true,
                    });
                    outcome.alternatives.push(Resolution::default());
                    continue;
                }
                // Alias points at a food the catalog no longer returns:
                // fall back to the regular search below.
                debug!(user_id, food_id = alias.food_id, "alias target missing, re-searching");
            }

            let resolution = self.resolver.resolve(user_id, &item.name).await?;
            let Some(best) = resolution.best() else {
                outcome.not_found.push(item.name.clone());
                continue;
            };

            let foods = self.catalog.get_foods(user_id, &[best.food.id]).await?;
            let Some(food) = foods.into_iter().next() else {
                outcome.not_found.push(item.name.clone());
                continue;
            };

            let matched = resolve_measure(item.unit.as_deref(), &food.measures);
            outcome.validated.push(ValidatedItem {
                original_name: item.name.clone(),
                food_id: food.id,
                food_name: food.name,
                quantity,
                measure_id: matched.measure.id,
                measure_name: matched.measure.name,
                grams_per_unit: matched.measure.grams,
                raw_grams: matched.raw_grams,
                alias_resolved: false,
            });
            outcome.alternatives.push(resolution);
        }

        debug!(
            user_id,
            validated = outcome.validated.len(),
            not_found = outcome.not_found.len(),
            "draft validated"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::catalog::{Food, FoodHit, FoodTier, LoggedServing, Measure};
    use crate::error::Result;

    struct StubCatalog {
        hits: HashMap<FoodTier, Vec<FoodHit>>,
        foods: HashMap<i64, Food>,
        logged: Mutex<Vec<LoggedServing>>,
    }

    impl StubCatalog {
        fn new() -> Self {
            let mut hits = HashMap::new();
            hits.insert(
                FoodTier::Common,
                vec![FoodHit {
                    id: 10,
                    name: "Huevo".to_string(),
                    tier: FoodTier::Common,
                    relevance: 0.9,
                }],
            );
            let mut foods = HashMap::new();
            foods.insert(
                10,
                Food {
                    id: 10,
                    name: "Huevo".to_string(),
                    measures: vec![Measure {
                        id: 1,
                        name: "unit".to_string(),
                        grams: 60.0,
                    }],
                },
            );
            foods.insert(
                20,
                Food {
                    id: 20,
                    name: "Patatas fritas".to_string(),
                    measures: vec![Measure {
                        id: 2,
                        name: "g".to_string(),
                        grams: 1.0,
                    }],
                },
            );
            Self {
                hits,
                foods,
                logged: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NutritionCatalog for StubCatalog {
        async fn search(&self, _user_id: &str, query: &str, tier: FoodTier) -> Result<Vec<FoodHit>> {
            Ok(self
                .hits
                .get(&tier)
                .map(|hits| {
                    hits.iter()
                        .filter(|h| h.name.to_lowercase().contains(query))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn get_foods(&self, _user_id: &str, ids: &[i64]) -> Result<Vec<Food>> {
            Ok(ids.iter().filter_map(|id| self.foods.get(id).cloned()).collect())
        }

        async fn log_servings(&self, _user_id: &str, servings: &[LoggedServing]) -> Result<()> {
            self.logged.lock().unwrap().extend_from_slice(servings);
            Ok(())
        }
    }

    fn empty_scan() -> AliasScan {
        AliasScan {
            rewritten: String::new(),
            matches: Vec::new(),
        }
    }

    #[tokio::test]
    async fn partial_success_separates_not_found() {
        let validator = Validator::new(Arc::new(StubCatalog::new()));
        let items = vec![
            DraftItem {
                name: "huevo".to_string(),
                quantity: Some(2.0),
                unit: Some("unidades".to_string()),
            },
            DraftItem {
                name: "ambrosia".to_string(),
                quantity: Some(1.0),
                unit: None,
            },
        ];

        let outcome = validator
            .validate_items("u1", &items, &empty_scan())
            .await
            .unwrap();

        assert_eq!(outcome.validated.len(), 1);
        assert_eq!(outcome.not_found, vec!["ambrosia".to_string()]);
        let item = &outcome.validated[0];
        assert_eq!(item.food_id, 10);
        assert!(!item.raw_grams);
        assert_eq!(item.total_grams(), 120.0);
    }

    #[tokio::test]
    async fn alias_resolved_items_skip_search() {
        use crate::preference::{Alias, AliasMatch};

        let validator = Validator::new(Arc::new(StubCatalog::new()));
        let alias = Alias {
            user_id: "u1".to_string(),
            term: "ptes".to_string(),
            food_id: 20,
            food_name: "Patatas fritas".to_string(),
            tier: FoodTier::Custom,
            usage_count: 3,
            active: true,
            manual: false,
        };
        let scan = AliasScan {
            rewritten: "patatas fritas".to_string(),
            matches: vec![AliasMatch {
                start: 0,
                end: 4,
                alias,
            }],
        };
        let items = vec![DraftItem {
            name: "patatas fritas".to_string(),
            quantity: Some(100.0),
            unit: Some("g".to_string()),
        }];

        let outcome = validator.validate_items("u1", &items, &scan).await.unwrap();
        assert_eq!(outcome.validated.len(), 1);
        let item = &outcome.validated[0];
        assert!(item.alias_resolved);
        assert_eq!(item.food_id, 20);
        assert_eq!(item.total_grams(), 100.0);
    }

    #[tokio::test]
    async fn missing_quantity_defaults_to_one() {
        let validator = Validator::new(Arc::new(StubCatalog::new()));
        let items = vec![DraftItem {
            name: "huevo".to_string(),
            quantity: None,
            unit: None,
        }];

        let outcome = validator
            .validate_items("u1", &items, &empty_scan())
            .await
            .unwrap();
        assert_eq!(outcome.validated[0].quantity, 1.0);
        // No unit given: grams fallback flags the quantity as raw grams.
        assert!(outcome.validated[0].raw_grams);
    }
}
