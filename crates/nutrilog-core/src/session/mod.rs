//! The conversation state machine.
//!
//! [`ConversationEngine`] dispatches inbound messages to per-state
//! processors over sessions held in a [`SessionStore`]. Processors get
//! a [`TurnContext`] with the locked session and the engine's
//! collaborators, and communicate back through replies and the next
//! state.

mod context;
mod engine;
mod flows;
mod model;
mod processors;
mod store;

pub use context::{EngineDeps, TurnContext};
pub use engine::ConversationEngine;
pub use model::{
    ConversationState, ConversationTurn, MessageFormat, OutboundMessage, PendingLearning,
    Session, TurnRole, SESSION_TTL_MINUTES,
};
pub use processors::{registry, StateProcessor};
pub use store::{InMemorySessionStore, SessionHandle, SessionStore};
