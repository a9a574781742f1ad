//! LlmMealParser - meal parsing over an OpenAI-compatible chat API.
//!
//! The model is instructed to answer with a single JSON object shaped
//! like [`MealDraft`]; anything else is a malformed-output error. The
//! client owns a bounded retry with exponential backoff around
//! transient transport failures.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nutrilog_core::error::{NutrilogError, Result};
use nutrilog_core::parser::{MealDraft, MealParser, ParseRequest};
use nutrilog_core::retry::{retry_async, RetryConfig};

use crate::config::resolve_llm_config;
use crate::http::map_http_error;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "\
You are a nutrition assistant that extracts meal information from chat \
messages in Spanish or English. Answer with ONE JSON object and nothing \
else, using this schema: {\"category\": \"breakfast|lunch|dinner|snack\", \
\"date\": \"YYYY-MM-DD or empty for today\", \"items\": [{\"name\": str, \
\"quantity\": number|null, \"unit\": str|null}], \"needs_clarification\": \
bool, \"clarifications\": [{\"kind\": \
\"missing_quantity|missing_size|ambiguous_unit|item_not_found\", \
\"item_name\": str, \"original_term\": str|null, \"question\": str}]}. \
Raise a clarification whenever quantity or size is genuinely ambiguous; \
do not invent amounts.";

/// [`MealParser`] implementation over an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct LlmMealParser {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl LlmMealParser {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Loads configuration from ~/.config/nutrilog/secret.json or
    /// environment variables.
    pub fn try_from_env() -> Result<Self> {
        let config = resolve_llm_config()?;
        let mut parser = Self::new(
            config.api_key,
            config.model_name.unwrap_or_else(|| DEFAULT_MODEL.into()),
        );
        if let Some(base_url) = config.base_url {
            parser.base_url = base_url;
        }
        Ok(parser)
    }

    /// Overrides the API endpoint, e.g. for a compatible local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_messages(&self, request: &ParseRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        }];
        for (role, text) in &request.history {
            messages.push(ChatMessage {
                role: role.clone(),
                content: text.clone(),
            });
        }
        let mut user_text = request.text.clone();
        if !request.preference_hints.is_empty() {
            user_text = format!(
                "{user_text}\n\nKnown user habits:\n{}",
                request.preference_hints.join("\n")
            );
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user_text,
        });
        messages
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| NutrilogError::Remote {
                message: format!("LLM request failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read LLM error body".to_string());
            return Err(map_http_error("LLM", status, body_text));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            NutrilogError::Remote {
                message: format!("failed to parse LLM response: {err}"),
                retryable: false,
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                NutrilogError::MalformedParserOutput("LLM returned no choices".to_string())
            })
    }
}

#[async_trait]
impl MealParser for LlmMealParser {
    async fn parse(&self, request: &ParseRequest) -> Result<MealDraft> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.build_messages(request),
            temperature: 0.0,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
        };

        let text = retry_async(&self.retry, "meal_parse", || self.send_request(&body)).await?;
        let draft = decode_draft(&text)?;
        debug!(
            items = draft.items.len(),
            clarifications = draft.clarifications.len(),
            "meal draft parsed"
        );
        Ok(draft)
    }
}

/// Decodes the model's answer into a draft, tolerating markdown code
/// fences around the JSON.
fn decode_draft(text: &str) -> Result<MealDraft> {
    let stripped = strip_code_fences(text);
    serde_json::from_str(stripped)
        .map_err(|err| NutrilogError::MalformedParserOutput(format!("{err}: {stripped}")))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}
