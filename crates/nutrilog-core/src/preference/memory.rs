//! Alias detection and preference learning over a repository.

use std::sync::Arc;

use tracing::debug;

use super::model::{Alias, ClarificationPreference, MeasurePreference};
use super::repository::PreferenceRepository;
use crate::catalog::FoodTier;
use crate::error::Result;
use crate::parser::ClarificationKind;
use crate::text::{is_word_boundary, normalize};

/// One alias occurrence in a scanned text, as byte offsets into the
/// normalized text.
#[derive(Debug, Clone)]
pub struct AliasMatch {
    pub start: usize,
    pub end: usize,
    pub alias: Alias,
}

/// Result of scanning a text for known aliases.
#[derive(Debug, Clone)]
pub struct AliasScan {
    /// Normalized text with every matched term replaced by its
    /// canonical food name
    pub rewritten: String,
    /// Matches in ascending start-offset order
    pub matches: Vec<AliasMatch>,
}

impl AliasScan {
    /// True when `item_name` came from an alias replacement.
    pub fn resolves(&self, item_name: &str) -> Option<&Alias> {
        let normalized = normalize(item_name);
        self.matches
            .iter()
            .map(|m| &m.alias)
            .find(|a| normalize(&a.food_name) == normalized)
    }
}

/// The per-user preference memory service.
///
/// Wraps a [`PreferenceRepository`] with the detection, replacement
/// and debounced-learning logic. The engine holds this as an optional
/// capability; without it, every lookup degrades to "nothing known".
pub struct PreferenceMemory {
    repository: Arc<dyn PreferenceRepository>,
}

impl PreferenceMemory {
    pub fn new(repository: Arc<dyn PreferenceRepository>) -> Self {
        Self { repository }
    }

    /// Finds an active alias for a term (normalized before lookup).
    pub async fn find_alias(&self, user_id: &str, term: &str) -> Result<Option<Alias>> {
        let alias = self.repository.find_alias(user_id, &normalize(term)).await?;
        Ok(alias.filter(|a| a.active))
    }

    /// Lists the user's active aliases.
    pub async fn list_aliases(&self, user_id: &str) -> Result<Vec<Alias>> {
        self.repository.list_aliases(user_id).await
    }

    /// Scans `text` for known alias terms and rewrites them to their
    /// canonical food names.
    ///
    /// Replacement proceeds in descending start-offset order so that
    /// earlier offsets stay valid while the string is rewritten. When
    /// two matched spans overlap, the longer one is kept and the
    /// shorter dropped (ties: the earlier match wins).
    pub async fn detect(&self, user_id: &str, text: &str) -> Result<AliasScan> {
        let normalized = normalize(text);
        let aliases = self.repository.list_aliases(user_id).await?;

        let mut found: Vec<AliasMatch> = Vec::new();
        for alias in aliases.into_iter().filter(|a| a.active) {
            if alias.term.is_empty() {
                continue;
            }
            let mut search_from = 0;
            while let Some(pos) = normalized[search_from..].find(&alias.term) {
                let start = search_from + pos;
                let end = start + alias.term.len();
                if is_word_boundary(&normalized, start, end) {
                    found.push(AliasMatch {
                        start,
                        end,
                        alias: alias.clone(),
                    });
                }
                search_from = end;
            }
        }

        found.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then((b.end - b.start).cmp(&(a.end - a.start)))
        });

        // Overlap policy: longest span wins, overlapped shorter spans drop.
        let mut kept: Vec<AliasMatch> = Vec::new();
        for m in found {
            let overlaps = kept.iter().any(|k| m.start < k.end && k.start < m.end);
            let longer_than_overlap = kept
                .iter()
                .filter(|k| m.start < k.end && k.start < m.end)
                .all(|k| (m.end - m.start) > (k.end - k.start));
            if !overlaps {
                kept.push(m);
            } else if longer_than_overlap {
                kept.retain(|k| !(m.start < k.end && k.start < m.end));
                kept.push(m);
            }
        }
        kept.sort_by_key(|m| m.start);

        let mut rewritten = normalized;
        for m in kept.iter().rev() {
            rewritten.replace_range(m.start..m.end, &m.alias.food_name.to_lowercase());
        }

        if !kept.is_empty() {
            debug!(user_id, matches = kept.len(), "alias detection rewrote text");
        }

        Ok(AliasScan {
            rewritten,
            matches: kept,
        })
    }

    /// Inserts or updates an alias. Saving an existing `(user, term)`
    /// key updates in place and bumps `usage_count`.
    pub async fn save_alias(
        &self,
        user_id: &str,
        term: &str,
        food_id: i64,
        food_name: &str,
        tier: FoodTier,
        manual: bool,
    ) -> Result<Alias> {
        let term = normalize(term);
        let alias = match self.repository.find_alias(user_id, &term).await? {
            Some(mut existing) => {
                existing.food_id = food_id;
                existing.food_name = food_name.to_string();
                existing.tier = tier;
                existing.usage_count += 1;
                existing.active = true;
                existing
            }
            None => Alias {
                user_id: user_id.to_string(),
                term,
                food_id,
                food_name: food_name.to_string(),
                tier,
                usage_count: 1,
                active: true,
                manual,
            },
        };
        self.repository.save_alias(&alias).await?;
        Ok(alias)
    }

    /// Bumps the usage counter of an alias that contributed to a
    /// logged meal.
    pub async fn record_alias_use(&self, user_id: &str, term: &str) -> Result<()> {
        if let Some(mut alias) = self.repository.find_alias(user_id, &normalize(term)).await? {
            alias.usage_count += 1;
            self.repository.save_alias(&alias).await?;
        }
        Ok(())
    }

    /// Deactivates an alias without deleting it.
    pub async fn deactivate_alias(&self, user_id: &str, term: &str) -> Result<()> {
        self.repository
            .deactivate_alias(user_id, &normalize(term))
            .await
    }

    /// Records one observed clarification answer and reports whether
    /// the `(term, kind)` pair just became confirmed.
    ///
    /// Debounce: the same answer must be seen at least twice before the
    /// preference confirms; a different answer resets the counter. The
    /// returned flag is true exactly once, at the transition.
    pub async fn record_clarification(
        &self,
        user_id: &str,
        term: &str,
        kind: ClarificationKind,
        answer: &str,
    ) -> Result<bool> {
        let term = normalize(term);
        let answer = normalize(answer);

        let mut became_confirmed = false;
        let preference = match self.repository.find_clarification(user_id, &term, kind).await? {
            Some(mut existing) if existing.answer == answer => {
                existing.occurrences += 1;
                if existing.occurrences >= 2 && !existing.confirmed {
                    existing.confirmed = true;
                    became_confirmed = true;
                }
                existing
            }
            Some(mut existing) => {
                // Answer changed: start the debounce over.
                existing.answer = answer;
                existing.occurrences = 1;
                existing.confirmed = false;
                existing
            }
            None => ClarificationPreference {
                user_id: user_id.to_string(),
                term,
                kind,
                answer,
                occurrences: 1,
                confirmed: false,
            },
        };
        self.repository.save_clarification(&preference).await?;

        if became_confirmed {
            debug!(
                user_id,
                term = %preference.term,
                "clarification preference confirmed"
            );
        }
        Ok(became_confirmed)
    }

    /// Confirmed clarification defaults, for auto-answering questions
    /// before they reach the user.
    pub async fn confirmed_defaults(&self, user_id: &str) -> Result<Vec<ClarificationPreference>> {
        let all = self.repository.list_clarifications(user_id).await?;
        Ok(all.into_iter().filter(|p| p.confirmed).collect())
    }

    /// Measure-preference hint lines for the parser context.
    pub async fn measure_hints(&self, user_id: &str) -> Result<Vec<String>> {
        let preferences = self.repository.list_measure_preferences(user_id).await?;
        Ok(preferences
            .iter()
            .map(|p| format!("{}: usually {} {}", p.food_pattern, p.quantity, p.unit))
            .collect())
    }

    /// Saves a measure preference.
    pub async fn save_measure_preference(&self, preference: &MeasurePreference) -> Result<()> {
        self.repository.save_measure_preference(preference).await
    }
}
