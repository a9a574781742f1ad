//! State processors: one component per conversation state.
//!
//! The dispatcher is a map from state tag to processor; adding a state
//! adds one entry here and never touches the dispatch loop.

mod meal;
mod preference;
mod search;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::TurnContext;
use super::model::ConversationState;
use crate::error::Result;

/// A processor for one conversation state.
///
/// Contract: may append turns and call collaborators, must set the
/// session's next state before returning, and must leave at least one
/// reply on every path (the engine backstops both).
#[async_trait]
pub trait StateProcessor: Send + Sync {
    async fn process(&self, ctx: &mut TurnContext<'_>) -> Result<()>;

    /// The known-recoverable state to roll back to when this
    /// processor fails.
    fn recovery_state(&self) -> ConversationState {
        ConversationState::Idle
    }
}

/// Builds the full state-to-processor registry.
pub fn registry() -> HashMap<ConversationState, Arc<dyn StateProcessor>> {
    let mut map: HashMap<ConversationState, Arc<dyn StateProcessor>> = HashMap::new();
    map.insert(ConversationState::Idle, Arc::new(meal::IdleProcessor));
    map.insert(
        ConversationState::AwaitingMealDescription,
        Arc::new(meal::MealDescriptionProcessor),
    );
    map.insert(
        ConversationState::Processing,
        Arc::new(meal::ProcessingProcessor),
    );
    map.insert(
        ConversationState::AwaitingClarification,
        Arc::new(meal::ClarificationProcessor),
    );
    map.insert(
        ConversationState::AwaitingConfirmation,
        Arc::new(meal::ConfirmationProcessor),
    );
    map.insert(
        ConversationState::AwaitingMemoryConfirmation,
        Arc::new(meal::MemoryConfirmationProcessor),
    );
    map.insert(
        ConversationState::AwaitingOcrCorrection,
        Arc::new(meal::OcrCorrectionProcessor),
    );
    map.insert(
        ConversationState::AwaitingPreferenceAction,
        Arc::new(preference::PreferenceActionProcessor),
    );
    map.insert(
        ConversationState::AwaitingAliasInput,
        Arc::new(preference::AliasInputProcessor),
    );
    map.insert(
        ConversationState::AwaitingAliasDeleteConfirm,
        Arc::new(preference::AliasDeleteConfirmProcessor),
    );
    map.insert(
        ConversationState::AwaitingFoodSearch,
        Arc::new(search::FoodSearchProcessor),
    );
    map.insert(
        ConversationState::AwaitingFoodSearchSelection,
        Arc::new(search::FoodSearchSelectionProcessor),
    );
    map.insert(
        ConversationState::AwaitingFoodSelection,
        Arc::new(search::FoodSelectionProcessor),
    );
    map
}
