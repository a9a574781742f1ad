//! Session domain model.
//!
//! The complete conversational state for one user's in-progress
//! meal-logging interaction. Sessions live in the session store and
//! are mutated only by the state machine and its processors.

use chrono::{DateTime, Duration, Utc};

use crate::catalog::FoodHit;
use crate::parser::{ClarificationItem, ClarificationKind, MealDraft};
use crate::preference::AliasScan;
use crate::resolver::Resolution;
use crate::validation::ValidatedItem;

/// Inactivity timeout after which a session expires.
pub const SESSION_TTL_MINUTES: i64 = 10;

/// The states of the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationState {
    Idle,
    AwaitingMealDescription,
    AwaitingClarification,
    Processing,
    AwaitingConfirmation,
    AwaitingMemoryConfirmation,
    AwaitingOcrCorrection,
    AwaitingPreferenceAction,
    AwaitingAliasInput,
    AwaitingFoodSearch,
    AwaitingFoodSelection,
    AwaitingFoodSearchSelection,
    AwaitingAliasDeleteConfirm,
}

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation; append-only, forms the parser's
/// replay context.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// How an outbound message should be rendered by the host transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    #[default]
    Plain,
    Markdown,
}

/// A reply for the host to deliver over the messaging channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub text: String,
    pub format: MessageFormat,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Plain,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Markdown,
        }
    }
}

/// A preference the session intends to learn, pending the user's
/// memory confirmation at the end of the flow.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingLearning {
    Alias {
        term: String,
        food_id: i64,
        food_name: String,
        tier: crate::catalog::FoodTier,
    },
    Clarification {
        term: String,
        kind: ClarificationKind,
        answer: String,
    },
}

/// Transient per-flow working data for the search and preference
/// management states. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct SearchScratch {
    /// Candidates currently presented as a numbered list
    pub candidates: Vec<crate::resolver::SearchCandidate>,
    /// Index into `Session::validated` of the item being re-picked
    pub target_item: Option<usize>,
    /// Food picked in the manual search flow, awaiting an alias term
    pub selected_food: Option<FoodHit>,
    /// Alias term pending delete confirmation
    pub pending_delete: Option<String>,
    /// Alias terms in last-listed order, for numeric delete commands
    pub alias_terms: Vec<String>,
    /// Text extracted from an image, awaiting correction
    pub ocr_text: Option<String>,
    /// `(original term, replacement name)` pairs from item-not-found
    /// answers, so an alias can be learned once the item resolves
    pub renamed: Vec<(String, String)>,
}

/// Per-user conversational session.
///
/// Exactly one active session exists per user; it expires when
/// `now - last_activity` exceeds the TTL and is cleared on completion,
/// cancel or expiry.
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
    pub state: ConversationState,
    pub turns: Vec<ConversationTurn>,
    pub pending_clarifications: Vec<ClarificationItem>,
    /// The parsed draft currently being worked on
    pub draft: Option<MealDraft>,
    pub validated: Vec<ValidatedItem>,
    /// Alternatives per validated item, aligned by index
    pub alternatives: Vec<Resolution>,
    /// The alias scan of the message that produced `draft`
    pub alias_scan: Option<AliasScan>,
    pub pending_learnings: Vec<PendingLearning>,
    pub scratch: SearchScratch,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            state: ConversationState::Idle,
            turns: Vec::new(),
            pending_clarifications: Vec::new(),
            draft: None,
            validated: Vec::new(),
            alternatives: Vec::new(),
            alias_scan: None,
            pending_learnings: Vec::new(),
            scratch: SearchScratch::default(),
            started_at: now,
            last_activity: now,
        }
    }

    /// Marks activity now.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// True when the inactivity timeout has elapsed.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.last_activity > ttl
    }

    pub fn push_turn(&mut self, role: TurnRole, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    /// Replay context for the parser: the most recent turns as
    /// (role, text) pairs, oldest first.
    pub fn history(&self, limit: usize) -> Vec<(String, String)> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns[skip..]
            .iter()
            .map(|t| (t.role.as_str().to_string(), t.text.clone()))
            .collect()
    }
}
