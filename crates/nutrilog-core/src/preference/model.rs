//! Preference domain models.

use serde::{Deserialize, Serialize};

use crate::catalog::FoodTier;
use crate::parser::ClarificationKind;

/// A per-user learned synonym mapping an input term to a catalog food.
///
/// Keyed by `(user_id, term)` with `term` already normalized. Aliases
/// are never physically deleted, only deactivated, so usage history
/// survives an accidental removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub user_id: String,
    /// Normalized input term
    pub term: String,
    pub food_id: i64,
    pub food_name: String,
    pub tier: FoodTier,
    /// How many logged meals this alias contributed to
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    /// True when created through preference management rather than
    /// learned from a conversation
    #[serde(default)]
    pub manual: bool,
}

/// A per-user default answer for a recurring clarification.
///
/// Confirmed only after the same answer was recorded at least twice;
/// unconfirmed preferences are never auto-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationPreference {
    pub user_id: String,
    /// Normalized food term the question was about
    pub term: String,
    pub kind: ClarificationKind,
    pub answer: String,
    pub occurrences: u32,
    pub confirmed: bool,
}

/// A per-user preferred unit/quantity default for a food name pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurePreference {
    pub user_id: String,
    /// Normalized food-name pattern (substring match)
    pub food_pattern: String,
    pub unit: String,
    pub quantity: f64,
}

fn default_true() -> bool {
    true
}
