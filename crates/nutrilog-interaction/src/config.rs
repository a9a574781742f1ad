//! Secret and endpoint configuration for the API clients.
//!
//! Configuration priority: ~/.config/nutrilog/secret.json > environment
//! variables.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

use nutrilog_core::error::{NutrilogError, Result};

/// Root structure of secret.json.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecretConfig {
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
}

/// LLM provider credentials and endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Nutrition catalog credentials and endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub api_token: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Loads ~/.config/nutrilog/secret.json if present.
pub fn load_secret_config() -> Result<SecretConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(SecretConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(|e| {
        NutrilogError::config(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| NutrilogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Resolves the LLM configuration: secret.json first, then the
/// NUTRILOG_LLM_API_KEY / NUTRILOG_LLM_MODEL / NUTRILOG_LLM_BASE_URL
/// environment variables.
pub fn resolve_llm_config() -> Result<LlmConfig> {
    if let Some(llm) = load_secret_config()?.llm {
        return Ok(llm);
    }
    let api_key = env::var("NUTRILOG_LLM_API_KEY").map_err(|_| {
        NutrilogError::config(
            "NUTRILOG_LLM_API_KEY not found in ~/.config/nutrilog/secret.json or environment",
        )
    })?;
    Ok(LlmConfig {
        api_key,
        model_name: env::var("NUTRILOG_LLM_MODEL").ok(),
        base_url: env::var("NUTRILOG_LLM_BASE_URL").ok(),
    })
}

/// Resolves the catalog configuration: secret.json first, then the
/// NUTRILOG_CATALOG_TOKEN / NUTRILOG_CATALOG_BASE_URL environment
/// variables.
pub fn resolve_catalog_config() -> Result<CatalogConfig> {
    if let Some(catalog) = load_secret_config()?.catalog {
        return Ok(catalog);
    }
    let api_token = env::var("NUTRILOG_CATALOG_TOKEN").map_err(|_| {
        NutrilogError::config(
            "NUTRILOG_CATALOG_TOKEN not found in ~/.config/nutrilog/secret.json or environment",
        )
    })?;
    Ok(CatalogConfig {
        api_token,
        base_url: env::var("NUTRILOG_CATALOG_BASE_URL").ok(),
    })
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NutrilogError::config("could not determine home directory"))?;
    Ok(home.join(".config").join("nutrilog").join("secret.json"))
}
