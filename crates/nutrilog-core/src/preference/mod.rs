//! Per-user alias and preference memory.
//!
//! What the system learns about a user lives here: aliases mapping
//! free-text terms to catalog foods, debounced clarification defaults,
//! and preferred measures. Persistence is behind
//! [`PreferenceRepository`]; [`PreferenceMemory`] adds the detection
//! and learning logic on top.

mod memory;
mod model;
mod repository;

pub use memory::{AliasMatch, AliasScan, PreferenceMemory};
pub use model::{Alias, ClarificationPreference, MeasurePreference};
pub use repository::PreferenceRepository;
