//! OpenAI implementation of the poster extractor.
//!
//! Sends the image as a base64 data URL through the chat-completions
//! vision API in JSON mode.

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

#[derive(Clone)]
pub struct OpenAiExtractor {
    client: Client,
    base_url: String,
    default_model: String,
}

impl Default for OpenAiExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiExtractor {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    /// Set a custom base URL (Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

#[derive(Deserialize)]
struct ChatResponse {
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

#[async_trait]
impl PosterExtractor for OpenAiExtractor {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn extract(&self, request: &ExtractorRequest<'_>) -> Result<ExtractionOutcome> {
        let model = request.model.unwrap_or(&self.default_model);
        let data_url = format!(
            "data:{};base64,{}",
            request.mime,
            STANDARD.encode(request.image)
        );

        let body = serde_json::json!({
            "model": model,
            "temperature": 0.0,
            "max_tokens": 4096,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": EXTRACTION_SYSTEM_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": build_user_text(request.caption, request.posted_at)},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]}
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", request.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractError::Provider(format!(
                "OpenAI API error: {error_text}"
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractError::Provider("No response from OpenAI".into()))?;

        let outcome = parse_outcome(&content)?;
        tracing::debug!(
            model,
            events = outcome.events.len(),
            "OpenAI extraction parsed"
        );
        Ok(outcome)
    }
}
