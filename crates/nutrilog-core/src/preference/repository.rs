//! Preference repository trait.
//!
//! Defines the interface for durable per-user preference storage,
//! decoupling the learning logic from the storage mechanism (TOML
//! files, database, remote API).

use async_trait::async_trait;

use super::model::{Alias, ClarificationPreference, MeasurePreference};
use crate::error::Result;
use crate::parser::ClarificationKind;

/// An abstract repository for per-user preference records.
///
/// Implementations must treat `save_alias` as an upsert on
/// `(user_id, term)` and must never physically delete aliases;
/// `deactivate_alias` flips the `active` flag instead.
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// Finds one alias by its normalized term.
    async fn find_alias(&self, user_id: &str, term: &str) -> Result<Option<Alias>>;

    /// Lists all active aliases of a user.
    async fn list_aliases(&self, user_id: &str) -> Result<Vec<Alias>>;

    /// Inserts or updates an alias keyed by `(user_id, term)`.
    async fn save_alias(&self, alias: &Alias) -> Result<()>;

    /// Marks an alias inactive. Missing aliases are a no-op.
    async fn deactivate_alias(&self, user_id: &str, term: &str) -> Result<()>;

    /// Finds a clarification preference by `(term, kind)`.
    async fn find_clarification(
        &self,
        user_id: &str,
        term: &str,
        kind: ClarificationKind,
    ) -> Result<Option<ClarificationPreference>>;

    /// Lists all clarification preferences of a user.
    async fn list_clarifications(&self, user_id: &str) -> Result<Vec<ClarificationPreference>>;

    /// Inserts or updates a clarification preference keyed by
    /// `(user_id, term, kind)`.
    async fn save_clarification(&self, preference: &ClarificationPreference) -> Result<()>;

    /// Lists all measure preferences of a user.
    async fn list_measure_preferences(&self, user_id: &str) -> Result<Vec<MeasurePreference>>;

    /// Inserts or updates a measure preference keyed by
    /// `(user_id, food_pattern)`.
    async fn save_measure_preference(&self, preference: &MeasurePreference) -> Result<()>;
}
