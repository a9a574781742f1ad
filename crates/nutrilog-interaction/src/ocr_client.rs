//! LlmOcrClient - photo-to-text extraction over a vision-capable
//! OpenAI-compatible chat API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nutrilog_core::error::{NutrilogError, Result};
use nutrilog_core::ocr::OcrService;
use nutrilog_core::retry::{retry_async, RetryConfig};

use crate::config::resolve_llm_config;
use crate::http::map_http_error;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const OCR_PROMPT: &str = "\
Transcribe any food-related text visible in this image (menu lines, \
package labels, handwritten notes). Answer with the transcribed text \
only. If the image contains no legible text, answer with the single \
word NONE.";

/// [`OcrService`] implementation over a vision chat endpoint.
#[derive(Clone)]
pub struct LlmOcrClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl LlmOcrClient {
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
        let mut client = Self::new(
            config.api_key,
            config.model_name.unwrap_or_else(|| DEFAULT_MODEL.into()),
        );
        if let Some(base_url) = config.base_url {
            client.base_url = base_url;
        }
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send_request(&self, body: &VisionRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| NutrilogError::Remote {
                message: format!("OCR request failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read OCR error body".to_string());
            return Err(map_http_error("OCR", status, text));
        }

        let parsed: VisionResponse = response.json().await.map_err(|err| {
            NutrilogError::Remote {
                message: format!("failed to parse OCR response: {err}"),
                retryable: false,
            }
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| NutrilogError::remote_permanent("OCR returned no choices"))
    }
}

#[async_trait]
impl OcrService for LlmOcrClient {
    async fn extract_text(&self, image: &[u8]) -> Result<Option<String>> {
        // The vision endpoint expects data URLs for inline images.
        let data_url = format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(image));
        let body = VisionRequest {
            model: self.model.clone(),
            messages: vec![VisionMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: OCR_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
        };

        let answer = retry_async(&self.retry, "ocr_extract", || self.send_request(&body)).await?;
        let answer = answer.trim().to_string();
        if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
            debug!("no legible text in image");
            return Ok(None);
        }
        Ok(Some(answer))
    }
}

#[derive(Serialize)]
struct VisionRequest {
    model: String,
    messages: Vec<VisionMessage>,
}

#[derive(Serialize)]
struct VisionMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct VisionResponse {
    choices: Vec<VisionChoice>,
}

#[derive(Deserialize)]
struct VisionChoice {
    message: VisionResponseMessage,
}

#[derive(Deserialize)]
struct VisionResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_parts_serialize_with_type_tags() {
        let part = ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/jpeg;base64,AA==".to_string(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "data:image/jpeg;base64,AA==");
    }
}
