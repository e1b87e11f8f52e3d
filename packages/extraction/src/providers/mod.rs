//! Pluggable AI providers for poster extraction.
//!
//! Each provider implements [`PosterExtractor`]; the [`ProviderRegistry`]
//! is built once at startup and maps the provider enum to a constructed
//! extractor, so there is no dynamic loading at call time. Which
//! provider is active, its API key, and the model override are resolved
//! from layered settings on every call.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicExtractor;
pub use openai::OpenAiExtractor;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{ExtractError, Result};
use crate::stores::{SettingScope, SettingsStore};
use crate::types::{DraftEvent, ExtractionOutcome, PosterClassification};

/// Supported AI providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Settings key holding this provider's API key.
    pub fn api_key_setting(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai_api_key",
            Self::Anthropic => "anthropic_api_key",
        }
    }

    /// Environment variable fallback for the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl FromStr for Provider {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ExtractError::Config(format!(
                "unsupported provider: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an extractor needs for one image.
pub struct ExtractorRequest<'a> {
    pub image: &'a [u8],
    pub mime: &'a str,
    pub caption: Option<&'a str>,
    /// Authoritative post time; relative date language on the poster
    /// resolves against this.
    pub posted_at: DateTime<Utc>,
    pub api_key: &'a SecretString,
    /// Model override from settings, if any.
    pub model: Option<&'a str>,
}

/// One provider's extraction strategy.
#[async_trait]
pub trait PosterExtractor: Send + Sync {
    fn provider(&self) -> Provider;

    /// Extract draft events (and optionally a poster classification)
    /// from the image.
    async fn extract(&self, request: &ExtractorRequest<'_>) -> Result<ExtractionOutcome>;
}

/// Active provider, its extractor, and resolved credentials.
pub struct ResolvedProvider {
    pub provider: Provider,
    pub extractor: Arc<dyn PosterExtractor>,
    pub api_key: SecretString,
    pub model: Option<String>,
}

/// Startup-built map from provider enum to constructed extractor.
pub struct ProviderRegistry {
    extractors: HashMap<Provider, Arc<dyn PosterExtractor>>,
    default_provider: Provider,
}

impl ProviderRegistry {
    pub fn new(default_provider: Provider) -> Self {
        Self {
            extractors: HashMap::new(),
            default_provider,
        }
    }

    /// Registry with both stock extractors registered.
    pub fn with_defaults() -> Self {
        Self::new(Provider::OpenAi)
            .register(Arc::new(OpenAiExtractor::new()))
            .register(Arc::new(AnthropicExtractor::new()))
    }

    pub fn register(mut self, extractor: Arc<dyn PosterExtractor>) -> Self {
        self.extractors.insert(extractor.provider(), extractor);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn PosterExtractor>> {
        self.extractors.get(&provider).cloned()
    }

    /// Resolve the active provider, API key, and model override.
    ///
    /// Key priority: feature-scoped stored value, then global stored
    /// value, then process environment. A missing key for the active
    /// provider is a configuration error, never retried.
    pub async fn resolve(&self, settings: &dyn SettingsStore) -> Result<ResolvedProvider> {
        let provider = match layered(settings, "ai_provider").await? {
            Some(name) => name.parse()?,
            None => self.default_provider,
        };

        let extractor = self.get(provider).ok_or_else(|| {
            ExtractError::Config(format!("no extractor registered for provider {provider}"))
        })?;

        let api_key = match layered(settings, provider.api_key_setting()).await? {
            Some(key) => key,
            None => std::env::var(provider.api_key_env()).map_err(|_| {
                ExtractError::Config(format!("no API key configured for provider {provider}"))
            })?,
        };

        let model = layered(settings, "extraction_model").await?;

        Ok(ResolvedProvider {
            provider,
            extractor,
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

async fn layered(settings: &dyn SettingsStore, key: &str) -> Result<Option<String>> {
    if let Some(value) = settings.get_setting(SettingScope::Feature, key).await? {
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }
    if let Some(value) = settings.get_setting(SettingScope::Global, key).await? {
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// JSON shape the extraction prompt asks providers for.
#[derive(Debug, Deserialize)]
struct WireOutcome {
    #[serde(default)]
    is_poster: Option<bool>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    cues: Vec<String>,
    #[serde(default)]
    events: Vec<DraftEvent>,
    #[serde(default)]
    extraction_confidence: Option<f32>,
}

/// Parse a provider's text response into an outcome.
///
/// One repair attempt is made before giving up: strip markdown fences
/// and slice out the embedded JSON object. The provider call itself is
/// never retried.
pub fn parse_outcome(raw: &str) -> Result<ExtractionOutcome> {
    let wire: WireOutcome = match serde_json::from_str(raw) {
        Ok(wire) => wire,
        Err(first_err) => {
            let repaired = embedded_json_object(raw)
                .ok_or_else(|| ExtractError::Parse(first_err.to_string()))?;
            serde_json::from_str(repaired)
                .map_err(|e| ExtractError::Parse(e.to_string()))?
        }
    };

    Ok(ExtractionOutcome {
        events: wire.events,
        classification: wire.is_poster.map(|is_poster| PosterClassification {
            is_poster,
            confidence: wire.confidence.unwrap_or(0.0),
            cues: wire.cues,
        }),
        confidence: wire.extraction_confidence,
    })
}

/// Slice the first embedded `{...}` object out of a response that
/// wrapped its JSON in prose or a markdown code block.
fn embedded_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Shared system prompt for poster extraction.
pub(crate) const EXTRACTION_SYSTEM_PROMPT: &str = r#"You read event poster images and extract structured event data.

Output a single JSON object with this structure:
{
  "is_poster": true | false,
  "confidence": 0.0-1.0,
  "cues": ["visual cues that informed the classification"],
  "extraction_confidence": 0.0-1.0,
  "events": [
    {
      "title": "Event title",
      "description": "1-2 sentence description if printed",
      "start_date": "YYYY-MM-DD",
      "start_time": "HH:MM (24h)",
      "end_date": "YYYY-MM-DD or null",
      "end_time": "HH:MM or null",
      "timezone": "IANA zone if printed, else null",
      "venue_name": null, "venue_address": null, "city": null,
      "organizer": null, "category": null, "price": null,
      "tags": [], "contact": null, "registration_url": null,
      "image_url": null, "url": null
    }
  ]
}

Only extract what is printed on the poster or stated in the caption.
Resolve relative dates ("this Friday", "next Saturday") against the
posted-at timestamp you are given. If the image is not an event poster,
return is_poster=false and an empty events array."#;

/// Shared user-message text for one request.
pub(crate) fn build_user_text(caption: Option<&str>, posted_at: DateTime<Utc>) -> String {
    match caption {
        Some(caption) => format!(
            "Posted at: {}\n\nCaption:\n{}",
            posted_at.to_rfc3339(),
            caption
        ),
        None => format!("Posted at: {}\n\n(no caption)", posted_at.to_rfc3339()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_str() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" anthropic ".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!(matches!(
            "llama".parse::<Provider>(),
            Err(ExtractError::Config(_))
        ));
    }

    #[test]
    fn parses_clean_response() {
        let raw = r#"{"is_poster": true, "confidence": 0.9, "cues": ["large date"],
                      "extraction_confidence": 0.8,
                      "events": [{"title": "Spring Market", "start_date": "2026-05-02"}]}"#;
        let outcome = parse_outcome(raw).unwrap();
        assert_eq!(outcome.events.len(), 1);
        let classification = outcome.classification.unwrap();
        assert!(classification.is_poster);
        assert_eq!(outcome.confidence, Some(0.8));
    }

    #[test]
    fn repairs_fenced_response() {
        let raw = "Here is the extraction:\n```json\n{\"is_poster\": false, \"events\": []}\n```";
        let outcome = parse_outcome(raw).unwrap();
        assert!(outcome.events.is_empty());
        assert!(!outcome.classification.unwrap().is_poster);
    }

    #[test]
    fn unrepairable_response_is_a_parse_error() {
        let err = parse_outcome("sorry, I cannot read this image").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn build_user_text_carries_the_anchor() {
        let posted_at = "2026-04-03T12:00:00Z".parse().unwrap();
        let text = build_user_text(Some("this friday!"), posted_at);
        assert!(text.contains("2026-04-03"));
        assert!(text.contains("this friday!"));
    }
}
