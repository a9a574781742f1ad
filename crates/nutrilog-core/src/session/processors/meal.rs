//! Processors for the core meal-logging loop: parse, clarify, confirm,
//! learn, plus OCR correction.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::StateProcessor;
use crate::catalog::LoggedServing;
use crate::error::Result;
use crate::session::context::TurnContext;
use crate::session::flows::{
    self, candidate_list, is_affirmative, is_cancel, is_negative, parse_selection,
    run_meal_pipeline, run_validation, CANDIDATE_LIST_LIMIT,
};
use crate::session::model::{ConversationState, PendingLearning};
use crate::text::normalize;

/// Idle: commands, or a fresh meal description.
pub struct IdleProcessor;

#[async_trait]
impl StateProcessor for IdleProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        if is_cancel(text) {
            ctx.reply("Nothing in progress. Tell me what you ate whenever you're ready.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }
        match normalize(text).as_str() {
            "/preferences" | "preferences" => {
                // The menu downgrades the state again if memory is not
                // configured.
                ctx.set_state(ConversationState::AwaitingPreferenceAction);
                preference_menu(ctx).await
            }
            "/search" | "search" => {
                ctx.reply("What food should I look up?");
                ctx.set_state(ConversationState::AwaitingFoodSearch);
                Ok(())
            }
            _ => run_meal_pipeline(ctx, text).await,
        }
    }
}

pub(crate) async fn preference_menu(ctx: &mut TurnContext<'_>) -> Result<()> {
    let Some(preferences) = &ctx.deps.preferences else {
        ctx.reply("Preference memory isn't configured on this setup.");
        ctx.set_state(ConversationState::Idle);
        return Ok(());
    };
    let aliases = preferences.list_aliases(&ctx.user_id).await?;
    ctx.session.scratch.alias_terms = aliases.iter().map(|a| a.term.clone()).collect();
    let listing = if aliases.is_empty() {
        "You have no saved aliases yet.".to_string()
    } else {
        let lines: Vec<String> = aliases
            .iter()
            .enumerate()
            .map(|(i, a)| {
                format!(
                    "{}. \"{}\" → {} (used {}×)",
                    i + 1,
                    a.term,
                    a.food_name,
                    a.usage_count
                )
            })
            .collect();
        format!("Your aliases:\n{}", lines.join("\n"))
    };
    ctx.reply_markdown(format!(
        "{listing}\nSend 'add', 'delete <number>', or 'done'."
    ));
    Ok(())
}

/// Waiting for the user to describe a meal.
pub struct MealDescriptionProcessor;

#[async_trait]
impl StateProcessor for MealDescriptionProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        if is_cancel(text) {
            ctx.reply("Cancelled.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }
        run_meal_pipeline(ctx, text).await
    }
}

/// A turn arrived while the previous one is still being processed.
/// Only reachable if the host bypasses per-user serialization.
pub struct ProcessingProcessor;

#[async_trait]
impl StateProcessor for ProcessingProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        if is_cancel(ctx.text) {
            ctx.reply("Cancelled.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }
        ctx.reply("Still working on your previous message, one moment.");
        ctx.set_state(ConversationState::Processing);
        Ok(())
    }
}

/// Waiting for an answer to the first pending clarification.
pub struct ClarificationProcessor;

#[async_trait]
impl StateProcessor for ClarificationProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        if is_cancel(text) {
            ctx.reply("Cancelled.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        let Some(clarification) = ctx.session.pending_clarifications.first().cloned() else {
            ctx.reply("Tell me what you ate and I'll log it.");
            ctx.set_state(ConversationState::AwaitingMealDescription);
            return Ok(());
        };

        let applied = match ctx.session.draft.as_mut() {
            Some(draft) => flows::apply_clarification_answer(&mut draft.items, &clarification, text),
            None => {
                ctx.reply("Let's start over. What did you eat?");
                ctx.set_state(ConversationState::AwaitingMealDescription);
                return Ok(());
            }
        };

        if let Err(err) = applied {
            if err.is_invalid_input() {
                // Re-prompt, no state change.
                ctx.reply(format!("Sorry, I didn't get that. {}", clarification.question));
                return Ok(());
            }
            return Err(err);
        }

        let term = clarification
            .original_term
            .clone()
            .unwrap_or_else(|| clarification.item_name.clone());
        match clarification.kind {
            crate::parser::ClarificationKind::ItemNotFound => {
                ctx.session
                    .scratch
                    .renamed
                    .push((term, normalize(text)));
            }
            kind => {
                ctx.session.pending_learnings.push(PendingLearning::Clarification {
                    term: normalize(&term),
                    kind,
                    answer: normalize(text),
                });
            }
        }

        ctx.session.pending_clarifications.remove(0);
        if let Some(next) = ctx.session.pending_clarifications.first() {
            let question = next.question.clone();
            ctx.reply(question);
            return Ok(());
        }

        run_validation(ctx).await
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingClarification
    }
}

/// Waiting for save/cancel/alternative-pick/correction.
pub struct ConfirmationProcessor;

#[async_trait]
impl StateProcessor for ConfirmationProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;

        if is_affirmative(text) {
            return save_meal(ctx).await;
        }

        if let Some(index) = parse_selection(text, ctx.session.validated.len()) {
            let item_name = ctx.session.validated[index].food_name.clone();
            let mut alternatives = ctx
                .session
                .alternatives
                .get(index)
                .map(|r| r.candidates.clone())
                .unwrap_or_default();
            // Only what is shown is selectable.
            alternatives.truncate(CANDIDATE_LIST_LIMIT);
            ctx.session.scratch.target_item = Some(index);
            if alternatives.len() <= 1 {
                ctx.session.scratch.candidates.clear();
                ctx.reply(format!(
                    "I have no stored alternatives for {item_name}. Send another name and I'll search for it."
                ));
            } else {
                ctx.reply_markdown(format!(
                    "Alternatives for {item_name}:\n{}\nPick a number or send a different name.",
                    candidate_list(&alternatives)
                ));
                ctx.session.scratch.candidates = alternatives;
            }
            ctx.set_state(ConversationState::AwaitingFoodSelection);
            return Ok(());
        }

        if is_negative(text) {
            ctx.reply("Cancelled. Nothing was logged.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        // Anything else is a correction: re-enter parsing with it.
        run_meal_pipeline(ctx, text).await
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingConfirmation
    }
}

async fn save_meal(ctx: &mut TurnContext<'_>) -> Result<()> {
    if ctx.session.validated.is_empty() {
        ctx.reply("There's nothing to save yet. What did you eat?");
        ctx.set_state(ConversationState::AwaitingMealDescription);
        return Ok(());
    }

    let draft = ctx.session.draft.clone().unwrap_or_default();
    let date = if draft.date.is_empty() {
        Utc::now().format("%Y-%m-%d").to_string()
    } else {
        draft.date.clone()
    };
    let servings: Vec<LoggedServing> = ctx
        .session
        .validated
        .iter()
        .map(|item| LoggedServing {
            food_id: item.food_id,
            measure_id: item.measure_id,
            quantity: item.quantity,
            grams: item.total_grams(),
            category: draft.category,
            date: date.clone(),
        })
        .collect();

    if let Err(err) = ctx.deps.catalog.log_servings(&ctx.user_id, &servings).await {
        warn!(user_id = %ctx.user_id, error = %err, "multi-serving write failed");
        ctx.reply(
            "I couldn't reach the food log just now. Your meal is still here — send 'save' to try again.",
        );
        ctx.set_state(ConversationState::AwaitingConfirmation);
        return Ok(());
    }

    // Count alias uses that made it into a logged meal.
    if let (Some(preferences), Some(scan)) = (&ctx.deps.preferences, ctx.session.alias_scan.clone())
    {
        for matched in &scan.matches {
            if let Err(err) = preferences
                .record_alias_use(&ctx.user_id, &matched.alias.term)
                .await
            {
                warn!(user_id = %ctx.user_id, error = %err, "alias usage bump failed");
            }
        }
    }

    ctx.reply(format!("Logged {} item(s). Enjoy!", servings.len()));

    if !ctx.session.pending_learnings.is_empty() && ctx.deps.preferences.is_some() {
        ctx.reply(memory_question(&ctx.session.pending_learnings));
        ctx.set_state(ConversationState::AwaitingMemoryConfirmation);
    } else {
        ctx.set_state(ConversationState::Idle);
        ctx.destroy_session = true;
    }
    Ok(())
}

fn memory_question(learnings: &[PendingLearning]) -> String {
    let lines: Vec<String> = learnings
        .iter()
        .map(|learning| match learning {
            PendingLearning::Alias { term, food_name, .. } => {
                format!("- \"{term}\" means {food_name}")
            }
            PendingLearning::Clarification { term, kind, answer } => {
                format!("- {term} {}: {answer}", kind.label())
            }
        })
        .collect();
    format!(
        "Should I remember this for next time?\n{}\n(yes/no)",
        lines.join("\n")
    )
}

/// Waiting for yes/no on remembering this flow's learnings.
pub struct MemoryConfirmationProcessor;

#[async_trait]
impl StateProcessor for MemoryConfirmationProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;

        if is_affirmative(text) {
            let learnings = std::mem::take(&mut ctx.session.pending_learnings);
            if let Some(preferences) = &ctx.deps.preferences {
                let mut confirmed_now = Vec::new();
                for learning in learnings {
                    match learning {
                        PendingLearning::Alias {
                            term,
                            food_id,
                            food_name,
                            tier,
                        } => {
                            preferences
                                .save_alias(&ctx.user_id, &term, food_id, &food_name, tier, false)
                                .await?;
                        }
                        PendingLearning::Clarification { term, kind, answer } => {
                            if preferences
                                .record_clarification(&ctx.user_id, &term, kind, &answer)
                                .await?
                            {
                                confirmed_now.push(term);
                            }
                        }
                    }
                }
                if confirmed_now.is_empty() {
                    ctx.reply("Noted!");
                } else {
                    ctx.reply(format!(
                        "Noted! I'll answer for {} automatically from now on.",
                        confirmed_now.join(", ")
                    ));
                }
            } else {
                ctx.reply("I can't store preferences on this setup, but the meal is logged.");
            }
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        if is_negative(text) {
            ctx.session.pending_learnings.clear();
            ctx.reply("Okay, I won't remember that.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        ctx.reply("Please answer yes or no.");
        Ok(())
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingMemoryConfirmation
    }
}

/// Waiting for the user to accept or fix OCR-extracted text.
pub struct OcrCorrectionProcessor;

#[async_trait]
impl StateProcessor for OcrCorrectionProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        if is_cancel(text) {
            ctx.reply("Cancelled.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        let meal_text = if is_affirmative(text) {
            match ctx.session.scratch.ocr_text.take() {
                Some(extracted) => extracted,
                None => {
                    ctx.reply("I lost the extracted text. Please type the meal instead.");
                    ctx.set_state(ConversationState::AwaitingMealDescription);
                    return Ok(());
                }
            }
        } else {
            // The reply is the corrected text.
            ctx.session.scratch.ocr_text = None;
            text.to_string()
        };

        run_meal_pipeline(ctx, &meal_text).await
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingMealDescription
    }
}
