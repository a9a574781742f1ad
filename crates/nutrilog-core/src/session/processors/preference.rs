//! Processors for the preference-management flow: listing, adding and
//! deactivating aliases.

use async_trait::async_trait;

use super::meal::preference_menu;
use super::StateProcessor;
use crate::error::Result;
use crate::session::context::TurnContext;
use crate::session::flows::{is_affirmative, is_cancel, parse_selection};
use crate::session::model::ConversationState;
use crate::text::normalize;

/// Menu state: list / add / delete n / done.
pub struct PreferenceActionProcessor;

#[async_trait]
impl StateProcessor for PreferenceActionProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let command = normalize(ctx.text);

        if is_cancel(&command) {
            ctx.reply("Okay. Tell me what you ate whenever you're ready.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        if command == "done" {
            ctx.reply("Okay. Tell me what you ate whenever you're ready.");
            ctx.set_state(ConversationState::Idle);
            return Ok(());
        }

        if command == "add" {
            ctx.reply("Send the alias as: term = food name (for example: ptes = patatas fritas).");
            ctx.set_state(ConversationState::AwaitingAliasInput);
            return Ok(());
        }

        if let Some(argument) = command.strip_prefix("delete") {
            let argument = argument.trim();
            let term = parse_selection(argument, ctx.session.scratch.alias_terms.len())
                .map(|i| ctx.session.scratch.alias_terms[i].clone())
                .or_else(|| {
                    let normalized = normalize(argument);
                    ctx.session
                        .scratch
                        .alias_terms
                        .iter()
                        .find(|t| **t == normalized)
                        .cloned()
                });
            match term {
                Some(term) => {
                    ctx.reply(format!("Deactivate the alias \"{term}\"? (yes/no)"));
                    ctx.session.scratch.pending_delete = Some(term);
                    ctx.set_state(ConversationState::AwaitingAliasDeleteConfirm);
                }
                None => {
                    ctx.reply("Which alias? Use its number from the list, e.g. 'delete 2'.");
                    ctx.set_state(ConversationState::AwaitingPreferenceAction);
                }
            }
            return Ok(());
        }

        // Anything else re-lists the menu.
        ctx.set_state(ConversationState::AwaitingPreferenceAction);
        preference_menu(ctx).await
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingPreferenceAction
    }
}

/// Waiting for a new alias: either `term = food name`, or just a term
/// for the food picked in the search flow.
pub struct AliasInputProcessor;

#[async_trait]
impl StateProcessor for AliasInputProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let text = ctx.text;
        let command = normalize(text);

        if is_cancel(text) {
            ctx.session.scratch.selected_food = None;
            ctx.reply("Okay.");
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        if command == "done" {
            ctx.session.scratch.selected_food = None;
            ctx.reply("Okay.");
            ctx.set_state(ConversationState::Idle);
            return Ok(());
        }

        let Some(preferences) = ctx.deps.preferences.clone() else {
            ctx.reply("Preference memory isn't configured on this setup.");
            ctx.set_state(ConversationState::Idle);
            return Ok(());
        };

        // A food picked in the search flow only needs its term.
        if let Some(food) = ctx.session.scratch.selected_food.clone() {
            let term = normalize(text);
            if term.is_empty() {
                ctx.reply("Send the word you want to use as the alias.");
                return Ok(());
            }
            preferences
                .save_alias(&ctx.user_id, &term, food.id, &food.name, food.tier, true)
                .await?;
            ctx.session.scratch.selected_food = None;
            ctx.reply(format!("Saved: \"{term}\" → {}.", food.name));
            ctx.set_state(ConversationState::Idle);
            return Ok(());
        }

        let Some((term, food_query)) = split_alias_input(text) else {
            ctx.reply("I need the format: term = food name.");
            return Ok(());
        };

        let resolution = ctx
            .deps
            .validator
            .resolver()
            .resolve(&ctx.user_id, &food_query)
            .await?;
        let Some(best) = resolution.best() else {
            ctx.reply(format!(
                "I couldn't find \"{food_query}\" in the catalog. Try another name."
            ));
            return Ok(());
        };

        preferences
            .save_alias(
                &ctx.user_id,
                &term,
                best.food.id,
                &best.food.name,
                best.food.tier,
                true,
            )
            .await?;
        ctx.reply(format!("Saved: \"{term}\" → {}.", best.food.name));
        ctx.set_state(ConversationState::AwaitingPreferenceAction);
        Ok(())
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingPreferenceAction
    }
}

fn split_alias_input(text: &str) -> Option<(String, String)> {
    let (term, food) = text.split_once('=').or_else(|| text.split_once(':'))?;
    let term = normalize(term);
    let food = food.trim().to_string();
    if term.is_empty() || food.is_empty() {
        return None;
    }
    Some((term, food))
}

/// Waiting for yes/no on deactivating an alias.
pub struct AliasDeleteConfirmProcessor;

#[async_trait]
impl StateProcessor for AliasDeleteConfirmProcessor {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()> {
        let term = ctx.session.scratch.pending_delete.take();
        ctx.set_state(ConversationState::AwaitingPreferenceAction);

        let Some(term) = term else {
            ctx.reply("Nothing pending to delete.");
            return Ok(());
        };

        if is_cancel(ctx.text) {
            ctx.reply(format!("Kept \"{term}\"."));
            ctx.set_state(ConversationState::Idle);
            ctx.destroy_session = true;
            return Ok(());
        }

        if is_affirmative(ctx.text) {
            if let Some(preferences) = &ctx.deps.preferences {
                preferences.deactivate_alias(&ctx.user_id, &term).await?;
                ctx.reply(format!("Deactivated \"{term}\". It can be re-added any time."));
            } else {
                ctx.reply("Preference memory isn't configured on this setup.");
            }
        } else {
            ctx.reply(format!("Kept \"{term}\"."));
        }
        Ok(())
    }

    fn recovery_state(&self) -> ConversationState {
        ConversationState::AwaitingPreferenceAction
    }
}
