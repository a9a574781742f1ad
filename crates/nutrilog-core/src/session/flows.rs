//! Shared conversational flows and small input-parsing helpers used by
//! several state processors.

use tracing::warn;

use super::context::TurnContext;
use super::model::{ConversationState, PendingLearning};
use crate::catalog::FoodTier;
use crate::error::{NutrilogError, Result};
use crate::parser::{ClarificationItem, ClarificationKind, DraftItem, ParseRequest};
use crate::preference::AliasScan;
use crate::resolver::SearchCandidate;
use crate::text::normalize;

/// How many prior turns the parser sees as replay context.
pub const HISTORY_LIMIT: usize = 10;

/// How many candidates a numbered list shows at most.
pub const CANDIDATE_LIST_LIMIT: usize = 5;

pub fn is_cancel(text: &str) -> bool {
    matches!(normalize(text).as_str(), "cancel" | "/cancel")
}

pub fn is_affirmative(text: &str) -> bool {
    matches!(
        normalize(text).as_str(),
        "yes" | "y" | "ok" | "okay" | "save" | "si" | "sí" | "guardar" | "vale"
    )
}

pub fn is_negative(text: &str) -> bool {
    matches!(normalize(text).as_str(), "no" | "n" | "cancel" | "/cancel")
}

/// Parses a 1-based list selection, returning a 0-based index.
pub fn parse_selection(text: &str, len: usize) -> Option<usize> {
    normalize(text)
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}

/// Pulls the first number out of a free-text answer ("2", "son 2,5").
///
/// Scans the raw text: [`normalize`] replaces punctuation with spaces,
/// which would split a decimal number apart.
pub fn parse_quantity(text: &str) -> Option<f64> {
    text.split_whitespace()
        .find_map(|token| {
            let token = token.replace(',', ".");
            let token = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '-');
            token.parse::<f64>().ok()
        })
        .filter(|q| *q > 0.0)
}

pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{}", quantity as i64)
    } else {
        format!("{quantity:.1}")
    }
}

/// Renders the top candidates as a numbered list.
pub fn candidate_list(candidates: &[SearchCandidate]) -> String {
    candidates
        .iter()
        .take(CANDIDATE_LIST_LIMIT)
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c.food.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the confirmation summary for the current validated items.
pub fn confirmation_summary(ctx: &TurnContext<'_>) -> String {
    let mut lines = vec!["Here's what I'll log:".to_string()];
    for (i, item) in ctx.session.validated.iter().enumerate() {
        let amount = if item.raw_grams {
            format!("{} g", format_quantity(item.quantity))
        } else {
            format!(
                "{} {} (≈{} g)",
                format_quantity(item.quantity),
                item.measure_name,
                format_quantity(item.total_grams())
            )
        };
        lines.push(format!("{}. {} — {}", i + 1, item.food_name, amount));
    }
    lines.push(
        "Reply 'save' to log it, a number to pick an alternative, 'no' to cancel, or send a correction."
            .to_string(),
    );
    lines.join("\n")
}

/// Applies a clarification answer to the draft item it targets.
///
/// Returns `InvalidInput` when the answer cannot be interpreted; the
/// caller re-prompts without a state change.
pub fn apply_clarification_answer(
    items: &mut [DraftItem],
    clarification: &ClarificationItem,
    answer: &str,
) -> Result<()> {
    let item = items
        .iter_mut()
        .find(|i| normalize(&i.name) == normalize(&clarification.item_name))
        .ok_or_else(|| {
            NutrilogError::internal(format!(
                "clarification target '{}' missing from draft",
                clarification.item_name
            ))
        })?;

    let answer_norm = normalize(answer);
    match clarification.kind {
        ClarificationKind::MissingQuantity => {
            let quantity = parse_quantity(answer)
                .ok_or_else(|| NutrilogError::InvalidInput(answer.to_string()))?;
            item.quantity = Some(quantity);
        }
        ClarificationKind::MissingSize => {
            if answer_norm.is_empty() || answer_norm.split(' ').count() > 2 {
                return Err(NutrilogError::InvalidInput(answer.to_string()));
            }
            item.name = format!("{} {}", item.name, answer_norm);
        }
        ClarificationKind::AmbiguousUnit => {
            if answer_norm.is_empty() {
                return Err(NutrilogError::InvalidInput(answer.to_string()));
            }
            item.unit = Some(answer_norm);
        }
        ClarificationKind::ItemNotFound => {
            if answer_norm.is_empty() {
                return Err(NutrilogError::InvalidInput(answer.to_string()));
            }
            item.name = answer_norm;
        }
    }
    Ok(())
}

/// The meal pipeline: alias scan, parse, auto-applied defaults, then
/// either clarification questions or validation.
pub async fn run_meal_pipeline(ctx: &mut TurnContext<'_>, raw_text: &str) -> Result<()> {
    let scan = match &ctx.deps.preferences {
        Some(preferences) => match preferences.detect(&ctx.user_id, raw_text).await {
            Ok(scan) => scan,
            Err(err) => {
                warn!(user_id = %ctx.user_id, error = %err, "alias detection failed, continuing without");
                AliasScan {
                    rewritten: normalize(raw_text),
                    matches: Vec::new(),
                }
            }
        },
        None => AliasScan {
            rewritten: normalize(raw_text),
            matches: Vec::new(),
        },
    };

    // Independent reads over disjoint namespaces: issue them together.
    let (defaults, hints) = match &ctx.deps.preferences {
        Some(preferences) => {
            let (defaults, hints) = tokio::join!(
                preferences.confirmed_defaults(&ctx.user_id),
                preferences.measure_hints(&ctx.user_id),
            );
            (defaults.unwrap_or_default(), hints.unwrap_or_default())
        }
        None => (Vec::new(), Vec::new()),
    };

    let mut preference_hints = hints;
    preference_hints.extend(
        defaults
            .iter()
            .map(|d| format!("{} {}: usually {}", d.term, d.kind.label(), d.answer)),
    );

    let request = ParseRequest {
        text: scan.rewritten.clone(),
        history: ctx.session.history(HISTORY_LIMIT),
        preference_hints,
    };

    let mut draft = match ctx.deps.parser.parse(&request).await {
        Ok(draft) => draft,
        Err(err) => {
            warn!(user_id = %ctx.user_id, error = %err, "meal parse failed");
            let message = match &err {
                NutrilogError::MalformedParserOutput(_) => {
                    "I couldn't make sense of that meal. Could you describe it again?"
                }
                e if e.is_transient() => {
                    "The service is a bit busy right now. Please send that again in a moment."
                }
                _ => "Something went wrong understanding that. Please try again.",
            };
            ctx.reply(message);
            ctx.set_state(ConversationState::AwaitingMealDescription);
            return Ok(());
        }
    };

    if draft.items.is_empty() {
        ctx.reply("I couldn't find any food in that message. What did you eat?");
        ctx.set_state(ConversationState::AwaitingMealDescription);
        return Ok(());
    }

    // Confirmed defaults answer their clarification before the user
    // ever sees the question.
    let clarifications = std::mem::take(&mut draft.clarifications);
    let mut remaining = Vec::new();
    let mut auto_applied = Vec::new();
    for clarification in clarifications {
        if clarification.kind == ClarificationKind::ItemNotFound {
            remaining.push(clarification);
            continue;
        }
        let term = normalize(
            clarification
                .original_term
                .as_deref()
                .unwrap_or(&clarification.item_name),
        );
        let default = defaults
            .iter()
            .find(|d| d.kind == clarification.kind && d.term == term);
        match default {
            Some(default)
                if apply_clarification_answer(&mut draft.items, &clarification, &default.answer)
                    .is_ok() =>
            {
                auto_applied.push(format!("{} {}", clarification.item_name, default.answer));
            }
            _ => remaining.push(clarification),
        }
    }
    if !auto_applied.is_empty() {
        ctx.reply(format!(
            "Using what you usually have: {}.",
            auto_applied.join(", ")
        ));
    }

    ctx.session.alias_scan = Some(scan);
    ctx.session.draft = Some(draft);

    if let Some(first) = remaining.first() {
        let question = first.question.clone();
        ctx.session.pending_clarifications = remaining;
        ctx.reply(question);
        ctx.set_state(ConversationState::AwaitingClarification);
        return Ok(());
    }

    run_validation(ctx).await
}

/// Validates the current draft and moves the session to either a
/// not-found retry loop or the confirmation summary.
pub async fn run_validation(ctx: &mut TurnContext<'_>) -> Result<()> {
    let Some(draft) = ctx.session.draft.clone() else {
        ctx.reply("Tell me what you ate and I'll log it.");
        ctx.set_state(ConversationState::AwaitingMealDescription);
        return Ok(());
    };
    let scan = ctx.session.alias_scan.clone().unwrap_or(AliasScan {
        rewritten: String::new(),
        matches: Vec::new(),
    });

    let outcome = ctx
        .deps
        .validator
        .validate_items(&ctx.user_id, &draft.items, &scan)
        .await?;

    ctx.session.validated = outcome.validated;
    ctx.session.alternatives = outcome.alternatives;

    if !outcome.not_found.is_empty() {
        let clarifications: Vec<ClarificationItem> = outcome
            .not_found
            .iter()
            .map(|name| ClarificationItem {
                kind: ClarificationKind::ItemNotFound,
                item_name: name.clone(),
                original_term: Some(name.clone()),
                question: format!("What else could \"{name}\" be called?"),
            })
            .collect();
        let question = clarifications[0].question.clone();
        ctx.session.pending_clarifications = clarifications;
        ctx.reply(format!(
            "I couldn't find: {}. {question}",
            outcome.not_found.join(", ")
        ));
        ctx.set_state(ConversationState::AwaitingClarification);
        return Ok(());
    }

    if ctx.session.validated.is_empty() {
        ctx.reply("I couldn't resolve anything from that. What did you eat?");
        ctx.set_state(ConversationState::AwaitingMealDescription);
        return Ok(());
    }

    // Items renamed through a not-found answer become alias learnings
    // once they resolve.
    let renamed = std::mem::take(&mut ctx.session.scratch.renamed);
    for (original_term, new_name) in renamed {
        let learned = ctx
            .session
            .validated
            .iter()
            .enumerate()
            .find(|(_, v)| normalize(&v.original_name) == normalize(&new_name))
            .map(|(i, v)| {
                let tier = ctx
                    .session
                    .alternatives
                    .get(i)
                    .and_then(|r| r.best())
                    .map(|c| c.food.tier)
                    .unwrap_or(FoodTier::FullCatalog);
                PendingLearning::Alias {
                    term: normalize(&original_term),
                    food_id: v.food_id,
                    food_name: v.food_name.clone(),
                    tier,
                }
            });
        if let Some(learning) = learned {
            ctx.session.pending_learnings.push(learning);
        }
    }

    let summary = confirmation_summary(ctx);
    ctx.reply_markdown(summary);
    ctx.set_state(ConversationState::AwaitingConfirmation);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parsing_is_one_based_and_bounded() {
        assert_eq!(parse_selection("2", 3), Some(1));
        assert_eq!(parse_selection(" 3 ", 3), Some(2));
        assert_eq!(parse_selection("0", 3), None);
        assert_eq!(parse_selection("4", 3), None);
        assert_eq!(parse_selection("dos", 3), None);
    }

    #[test]
    fn quantity_parsing_accepts_decimal_comma() {
        assert_eq!(parse_quantity("2"), Some(2.0));
        assert_eq!(parse_quantity("2,5"), Some(2.5));
        assert_eq!(parse_quantity("unas 2,5 tazas"), Some(2.5));
        assert_eq!(parse_quantity("2.5"), Some(2.5));
        assert_eq!(parse_quantity("¿1.5?"), Some(1.5));
        assert_eq!(parse_quantity("150g"), Some(150.0));
        assert_eq!(parse_quantity("muchas"), None);
        assert_eq!(parse_quantity("0"), None);
        assert_eq!(parse_quantity("-2"), None);
    }

    #[test]
    fn affirmatives_and_negatives() {
        assert!(is_affirmative("Sí"));
        assert!(is_affirmative("save"));
        assert!(is_negative("NO"));
        assert!(is_cancel("/cancel"));
        assert!(!is_affirmative("nope"));
    }

    #[test]
    fn clarification_answers_mutate_the_right_item() {
        let mut items = vec![
            DraftItem {
                name: "huevo".into(),
                quantity: None,
                unit: None,
            },
            DraftItem {
                name: "arroz".into(),
                quantity: Some(100.0),
                unit: Some("g".into()),
            },
        ];
        let clarification = ClarificationItem {
            kind: ClarificationKind::MissingQuantity,
            item_name: "huevo".into(),
            original_term: None,
            question: "How many?".into(),
        };
        apply_clarification_answer(&mut items, &clarification, "2").unwrap();
        assert_eq!(items[0].quantity, Some(2.0));

        let size = ClarificationItem {
            kind: ClarificationKind::MissingSize,
            item_name: "huevo".into(),
            original_term: None,
            question: "What size?".into(),
        };
        apply_clarification_answer(&mut items, &size, "grande").unwrap();
        assert_eq!(items[0].name, "huevo grande");
    }

    #[test]
    fn unparseable_answers_are_invalid_input() {
        let mut items = vec![DraftItem {
            name: "huevo".into(),
            quantity: None,
            unit: None,
        }];
        let clarification = ClarificationItem {
            kind: ClarificationKind::MissingQuantity,
            item_name: "huevo".into(),
            original_term: None,
            question: "How many?".into(),
        };
        let err = apply_clarification_answer(&mut items, &clarification, "several").unwrap_err();
        assert!(err.is_invalid_input());
    }
}
