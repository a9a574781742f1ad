//! CatalogApiClient - HTTP client for the remote nutrition catalog.
//!
//! Implements [`NutritionCatalog`] against a REST API with tiered food
//! search, food detail lookup and a batched serving write. No internal
//! retry: the engine treats a failed write as "still savable" and lets
//! the user resend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nutrilog_core::catalog::{Food, FoodHit, FoodTier, LoggedServing, NutritionCatalog};
use nutrilog_core::error::{NutrilogError, Result};

use crate::config::resolve_catalog_config;
use crate::http::map_http_error;

const DEFAULT_BASE_URL: &str = "https://api.nutrilog.app/v2";

/// HTTP [`NutritionCatalog`] implementation.
#[derive(Clone)]
pub struct CatalogApiClient {
    client: Client,
    api_token: String,
    base_url: String,
}

impl CatalogApiClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Loads configuration from ~/.config/nutrilog/secret.json or
    /// environment variables.
    pub fn try_from_env() -> Result<Self> {
        let config = resolve_catalog_config()?;
        let mut catalog = Self::new(config.api_token);
        if let Some(base_url) = config.base_url {
            catalog.base_url = base_url;
        }
        Ok(catalog)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_token)
            .query(query)
            .send()
            .await
            .map_err(|err| NutrilogError::Remote {
                message: format!("catalog request failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read catalog error body".to_string());
            return Err(map_http_error("catalog", status, body));
        }

        response.json().await.map_err(|err| NutrilogError::Remote {
            message: format!("failed to parse catalog response: {err}"),
            retryable: false,
        })
    }
}

/// Wire name of a tier in the search endpoint's `tier` parameter.
fn tier_param(tier: FoodTier) -> &'static str {
    match tier {
        FoodTier::Custom => "custom",
        FoodTier::Favorite => "favorite",
        FoodTier::Common => "common",
        FoodTier::Supplement => "supplement",
        FoodTier::FullCatalog => "all",
    }
}

#[async_trait]
impl NutritionCatalog for CatalogApiClient {
    async fn search(&self, user_id: &str, query: &str, tier: FoodTier) -> Result<Vec<FoodHit>> {
        let response: SearchResponse = self
            .get_json(
                "/foods/search",
                &[
                    ("user_id", user_id.to_string()),
                    ("query", query.to_string()),
                    ("tier", tier_param(tier).to_string()),
                ],
            )
            .await?;
        debug!(user_id, query, ?tier, hits = response.foods.len(), "catalog search");
        Ok(response
            .foods
            .into_iter()
            .map(|dto| FoodHit {
                id: dto.id,
                name: dto.name,
                tier,
                relevance: dto.relevance,
            })
            .collect())
    }

    async fn get_foods(&self, user_id: &str, ids: &[i64]) -> Result<Vec<Food>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let response: FoodsResponse = self
            .get_json(
                "/foods",
                &[("user_id", user_id.to_string()), ("ids", joined)],
            )
            .await?;
        Ok(response.foods)
    }

    async fn log_servings(&self, user_id: &str, servings: &[LoggedServing]) -> Result<()> {
        let body = LogServingsRequest {
            user_id: user_id.to_string(),
            servings: servings.to_vec(),
        };
        let response = self
            .client
            .post(format!("{}/servings/batch", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| NutrilogError::Remote {
                message: format!("serving write failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read catalog error body".to_string());
            return Err(map_http_error("catalog", status, text));
        }
        debug!(user_id, count = servings.len(), "servings logged");
        Ok(())
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    foods: Vec<FoodHitDto>,
}

#[derive(Deserialize)]
struct FoodHitDto {
    id: i64,
    name: String,
    #[serde(default)]
    relevance: f64,
}

#[derive(Deserialize)]
struct FoodsResponse {
    foods: Vec<Food>,
}

#[derive(Serialize)]
struct LogServingsRequest {
    user_id: String,
    servings: Vec<LoggedServing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_params_match_the_wire_names() {
        assert_eq!(tier_param(FoodTier::Custom), "custom");
        assert_eq!(tier_param(FoodTier::FullCatalog), "all");
    }

    #[test]
    fn search_response_tolerates_missing_relevance() {
        let json = r#"{"foods": [{"id": 7, "name": "Huevo"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.foods[0].relevance, 0.0);
    }
}
