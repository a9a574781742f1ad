//! Turn context handed to state processors.

use std::sync::Arc;

use super::model::{ConversationState, MessageFormat, OutboundMessage, Session};
use crate::catalog::NutritionCatalog;
use crate::ocr::OcrService;
use crate::parser::MealParser;
use crate::preference::PreferenceMemory;
use crate::validation::Validator;

/// The collaborators processors may call. Preference memory and OCR
/// are optional capabilities; their absence is checked once here, not
/// scattered through business logic.
pub struct EngineDeps {
    pub parser: Arc<dyn MealParser>,
    pub catalog: Arc<dyn NutritionCatalog>,
    pub validator: Validator,
    pub preferences: Option<Arc<PreferenceMemory>>,
    pub ocr: Option<Arc<dyn OcrService>>,
}

/// Everything one processor invocation may touch: the inbound text,
/// the exclusively-held session, collaborators, and the outbound
/// replies being accumulated.
pub struct TurnContext<'a> {
    pub user_id: String,
    pub text: &'a str,
    pub session: &'a mut Session,
    pub deps: &'a EngineDeps,
    pub replies: Vec<OutboundMessage>,
    /// Set by a processor to clear the session after the turn
    pub destroy_session: bool,
}

impl<'a> TurnContext<'a> {
    pub fn new(text: &'a str, session: &'a mut Session, deps: &'a EngineDeps) -> Self {
        let user_id = session.user_id.clone();
        Self {
            user_id,
            text,
            session,
            deps,
            replies: Vec::new(),
            destroy_session: false,
        }
    }

    /// Appends a plain-text reply.
    pub fn reply(&mut self, text: impl Into<String>) {
        self.replies.push(OutboundMessage::plain(text));
    }

    /// Appends a markdown reply.
    pub fn reply_markdown(&mut self, text: impl Into<String>) {
        self.replies.push(OutboundMessage {
            text: text.into(),
            format: MessageFormat::Markdown,
        });
    }

    /// Sets the session's next state.
    pub fn set_state(&mut self, state: ConversationState) {
        self.session.state = state;
    }
}
