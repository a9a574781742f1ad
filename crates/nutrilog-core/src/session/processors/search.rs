//! Processors for the manual catalog search flow and the
//! pick-an-alternative flow reached from confirmation.

use async_trait::async_trait;

use super::StateProcessor;
use crate::error::Result;
use crate::resolver::resolve_measure;
use crate::session::context::TurnContext;
use crate::session::flows::{
    candidate_list, confirmation_summary, is_cancel, parse_selection, CANDIDATE_LIST_LIMIT,
};
use crate::session::model::{ConversationState, PendingLearning};
use crate::text::normalize;
use crate::validation::ValidatedItem;

/// Waiting for a search query.
pub struct FoodSearchProcessor;

#[async_trait]
impl StateProcessor for FoodSearchProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        if is_cancel(text) {
            ctx.reply("Okay.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }
        search_and_list(ctx, text, ConversationState::AwaitingFoodSearchSelection).await
    }
}

/// Runs a search and presents a numbered candidate list, staying in
/// the current state when nothing matched.
async fn search_and_list(
    ctx: &mut TurnContext<'_>,
    query: &str,
    next_state: ConversationState,
) -> Result<()> {
    let resolution = ctx.deps.validator.resolver().resolve(&ctx.user_id, query).await?;
    if resolution.candidates.is_empty() {
        ctx.reply(format!(
            "Nothing found for \"{}\". Try another name.",
            normalize(query)
        ));
        return Ok(());
    }
    // Only what is shown is selectable.
    let mut candidates = resolution.candidates;
    candidates.truncate(CANDIDATE_LIST_LIMIT);
    ctx.reply_markdown(format!(
        "Found:\n{}\nPick a number.",
        candidate_list(&candidates)
    ));
    ctx.session.scratch.candidates = candidates;
    ctx.set_state(next_state);
    Ok(())
}

/// Waiting for a pick from the manual search results.
pub struct FoodSearchSelectionProcessor;

#[async_trait]
impl StateProcessor for FoodSearchSelectionProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        if is_cancel(text) {
            ctx.reply("Okay.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }
        if normalize(text) == "done" {
            ctx.session.scratch.candidates.clear();
            ctx.reply("Okay.");
            ctx.set_state(ConversationState::Idle);
            return Ok(());
        }

        let Some(index) = parse_selection(text, ctx.session.scratch.candidates.len()) else {
            // Treat anything non-numeric as a new query.
            return search_and_list(ctx, text, ConversationState::AwaitingFoodSearchSelection).await;
        };

        let candidate = ctx.session.scratch.candidates[index].clone();
        let foods = ctx
            .deps
            .catalog
            .get_foods(&ctx.user_id, &[candidate.food.id])
            .await?;
        let detail = foods
            .first()
            .map(|food| {
                let measures: Vec<String> = food
                    .measures
                    .iter()
                    .map(|m| format!("{} ({} g)", m.name, m.grams))
                    .collect();
                if measures.is_empty() {
                    format!("{}: no measures, logged in grams.", food.name)
                } else {
                    format!("{}: {}", food.name, measures.join(", "))
                }
            })
            .unwrap_or_else(|| candidate.food.name.clone());

        ctx.session.scratch.selected_food = Some(candidate.food);
        ctx.reply(format!(
            "{detail}\nSend a term to save this as an alias, or 'done'."
        ));
        ctx.set_state(ConversationState::AwaitingAliasInput);
        Ok(())
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingFoodSearch
    }
}

/// Waiting for an alternative pick for one validated item.
pub struct FoodSelectionProcessor;

#[async_trait]
impl StateProcessor for FoodSelectionProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;

        let Some(target) = ctx.session.scratch.target_item else {
            let summary = confirmation_summary(ctx);
            ctx.reply_markdown(summary);
            ctx.set_state(ConversationState::AwaitingConfirmation);
            return Ok(());
        };

        if is_cancel(text) {
            ctx.session.scratch.target_item = None;
            ctx.session.scratch.candidates.clear();
            let summary = confirmation_summary(ctx);
            ctx.reply_markdown(summary);
            ctx.set_state(ConversationState::AwaitingConfirmation);
            return Ok(());
        }

        let Some(index) = parse_selection(text, ctx.session.scratch.candidates.len()) else {
            // A name instead of a number: search for it.
            return search_and_list(ctx, text, ConversationState::AwaitingFoodSelection).await;
        };

        let candidate = ctx.session.scratch.candidates[index].clone();
        let foods = ctx
            .deps
            .catalog
            .get_foods(&ctx.user_id, &[candidate.food.id])
            .await?;
        let Some(food) = foods.into_iter().next() else {
            ctx.reply("That entry is gone from the catalog. Pick another one.");
            return Ok(());
        };

        let previous = ctx.session.validated[target].clone();
        let unit = ctx
            .session
            .draft
            .as_ref()
            .and_then(|draft| {
                draft
                    .items
                    .iter()
                    .find(|item| normalize(&item.name) == normalize(&previous.original_name))
            })
            .and_then(|item| item.unit.clone());
        let matched = resolve_measure(unit.as_deref(), &food.measures);

        ctx.session.validated[target] = ValidatedItem {
            original_name: previous.original_name.clone(),
            food_id: food.id,
            food_name: food.name.clone(),
            quantity: previous.quantity,
            measure_id: matched.measure.id,
            measure_name: matched.measure.name,
            grams_per_unit: matched.measure.grams,
            raw_grams: matched.raw_grams,
            alias_resolved: false,
        };
        ctx.session.pending_learnings.push(PendingLearning::Alias {
            term: normalize(&previous.original_name),
            food_id: food.id,
            food_name: food.name,
            tier: candidate.food.tier,
        });
        ctx.session.scratch.target_item = None;
        ctx.session.scratch.candidates.clear();

        let summary = confirmation_summary(ctx);
        ctx.reply_markdown(summary);
        ctx.set_state(ConversationState::AwaitingConfirmation);
        Ok(())
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingConfirmation
    }
}
