//! Core engine for conversational meal logging.
//!
//! Free text like "2 huevos grandes y 100g de arroz" comes in over a
//! messaging channel; this crate parses it into a structured draft,
//! resolves each item against a tiered nutrition catalog, asks
//! clarifying questions when the input is ambiguous, and logs the
//! confirmed servings. Along the way it learns per-user vocabulary
//! (aliases) and recurring clarification answers so later meals need
//! fewer questions.
//!
//! The crate is transport- and provider-agnostic: the language-model
//! parser, the catalog, OCR and preference persistence are all trait
//! boundaries ([`parser::MealParser`], [`catalog::NutritionCatalog`],
//! [`ocr::OcrService`], [`preference::PreferenceRepository`]) with
//! concrete implementations living in the companion crates.

pub mod catalog;
pub mod error;
pub mod ocr;
pub mod parser;
pub mod preference;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod text;
pub mod validation;

pub use error::{NutrilogError, Result};
