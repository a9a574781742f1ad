//! Meal parser boundary.
//!
//! The language model that turns free text into a structured draft is
//! a black box behind [`MealParser`]: text plus conversational context
//! in, a [`MealDraft`] with ambiguity markers out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::MealCategory;
use crate::error::Result;

/// The kind of follow-up question a draft item needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationKind {
    MissingQuantity,
    MissingSize,
    AmbiguousUnit,
    ItemNotFound,
}

impl ClarificationKind {
    /// Short human label, used in preference hints and summaries.
    pub fn label(self) -> &'static str {
        match self {
            ClarificationKind::MissingQuantity => "quantity",
            ClarificationKind::MissingSize => "size",
            ClarificationKind::AmbiguousUnit => "unit",
            ClarificationKind::ItemNotFound => "name",
        }
    }
}

/// A follow-up question raised when parsed input is ambiguous.
///
/// `original_term` keeps the user's raw wording so a learned
/// preference can later be recorded against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationItem {
    pub kind: ClarificationKind,
    /// Name of the draft item this question is about
    pub item_name: String,
    /// The raw term as the user typed it, if different
    pub original_term: Option<String>,
    /// Question text to present to the user
    pub question: String,
}

/// One item of a parsed draft, before catalog resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
}

/// Structured output of the meal parser.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MealDraft {
    #[serde(default)]
    pub category: MealCategory,
    /// ISO 8601 date (YYYY-MM-DD); empty means "today" to the catalog
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub items: Vec<DraftItem>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifications: Vec<ClarificationItem>,
}

/// Input to one parse call: the message under parse plus replayable
/// context the model should take into account.
#[derive(Debug, Clone, Default)]
pub struct ParseRequest {
    /// The (alias-rewritten) text to parse
    pub text: String,
    /// Prior turns as (role, text), oldest first
    pub history: Vec<(String, String)>,
    /// Known user preferences, rendered as short hint lines
    pub preference_hints: Vec<String>,
}

impl ParseRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An abstract meal parser.
///
/// Implementations own their bounded retry with exponential backoff
/// around transient failures; callers see only the final outcome.
#[async_trait]
pub trait MealParser: Send + Sync {
    async fn parse(&self, request: &ParseRequest) -> Result<MealDraft>;
}
