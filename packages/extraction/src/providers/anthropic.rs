//! Anthropic implementation of the poster extractor.
//!
//! Sends the image as a base64 source block through the messages API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::{
    build_user_text, parse_outcome, ExtractorRequest, PosterExtractor, Provider,
    EXTRACTION_SYSTEM_PROMPT,
};
use crate::error::{ExtractError, Result};
use crate::types::ExtractionOutcome;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicExtractor {
    client: Client,
    base_url: String,
    default_model: String,
}

impl Default for AnthropicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicExtractor {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.anthropic.com".to_string(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl PosterExtractor for AnthropicExtractor {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn extract(&self, request: &ExtractorRequest<'_>) -> Result<ExtractionOutcome> {
        let model = request.model.unwrap_or(&self.default_model);

        let body = serde_json::json!({
            "model": model,
            "max_tokens": 4096,
            "system": EXTRACTION_SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": [
                    {"type": "image", "source": {
                        "type": "base64",
                        "media_type": request.mime,
                        "data": STANDARD.encode(request.image),
                    }},
                    {"type": "text", "text": build_user_text(request.caption, request.posted_at)}
                ]}
            ]
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", request.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractError::Provider(format!(
                "Anthropic API error: {error_text}"
            )));
        }

        let messages_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        let content = messages_response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ExtractError::Provider("No text content from Anthropic".into()))?;

        let outcome = parse_outcome(&content)?;
        tracing::debug!(
            model,
            events = outcome.events.len(),
            "Anthropic extraction parsed"
        );
        Ok(outcome)
    }
}
