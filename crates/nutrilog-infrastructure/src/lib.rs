//! File-based persistence for the NUTRILOG engine.

pub mod paths;
pub mod toml_preference_repository;

pub use toml_preference_repository::TomlPreferenceRepository;
