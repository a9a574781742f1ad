//! Nutrition catalog boundary.
//!
//! The remote catalog is a black box behind the [`NutritionCatalog`]
//! trait: tiered food search, measure lookup and the multi-serving
//! write that finally records a meal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One of the catalog's food categories, queried in fixed precedence
/// order: a user's own curated data always beats a generic match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodTier {
    /// Foods created by the user
    Custom,
    /// Foods the user marked as favorites
    Favorite,
    /// Curated common foods
    Common,
    /// Supplements
    Supplement,
    /// The full catalog
    FullCatalog,
}

impl FoodTier {
    /// All tiers in search precedence order.
    pub const ORDERED: [FoodTier; 5] = [
        FoodTier::Custom,
        FoodTier::Favorite,
        FoodTier::Common,
        FoodTier::Supplement,
        FoodTier::FullCatalog,
    ];

    /// Precedence rank, lower wins.
    pub fn precedence(self) -> u8 {
        match self {
            FoodTier::Custom => 0,
            FoodTier::Favorite => 1,
            FoodTier::Common => 2,
            FoodTier::Supplement => 3,
            FoodTier::FullCatalog => 4,
        }
    }
}

/// A search result from one catalog tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodHit {
    pub id: i64,
    pub name: String,
    pub tier: FoodTier,
    /// Catalog-reported relevance in `[0, 1]`
    pub relevance: f64,
}

/// A catalog-defined unit for a food with its gram weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: i64,
    pub name: String,
    /// Grams represented by one unit of this measure
    pub grams: f64,
}

impl Measure {
    /// The implicit fallback measure: one unit equals one gram.
    pub fn default_gram() -> Self {
        Self {
            id: 0,
            name: "g".to_string(),
            grams: 1.0,
        }
    }
}

/// A full catalog entry with its available measures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    pub name: String,
    pub measures: Vec<Measure>,
}

/// Meal category as reported by the parser and written to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Snack,
}

/// One serving of the final multi-item write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedServing {
    pub food_id: i64,
    pub measure_id: i64,
    pub quantity: f64,
    /// Total grams for the serving, already computed by validation
    pub grams: f64,
    pub category: MealCategory,
    /// ISO 8601 date (YYYY-MM-DD)
    pub date: String,
}

/// An abstract client for the remote nutrition catalog.
///
/// Implementations surface failures upward without internal retry;
/// user-driven re-invocation (e.g. resending a save command) is the
/// retry mechanism at this boundary.
#[async_trait]
pub trait NutritionCatalog: Send + Sync {
    /// Searches one tier of the catalog for foods matching `query`.
    async fn search(&self, user_id: &str, query: &str, tier: FoodTier) -> Result<Vec<FoodHit>>;

    /// Fetches full catalog entries, including measures, by id.
    async fn get_foods(&self, user_id: &str, ids: &[i64]) -> Result<Vec<Food>>;

    /// Writes a multi-serving meal entry in one call.
    async fn log_servings(&self, user_id: &str, servings: &[LoggedServing]) -> Result<()>;
}
