//! Testing utilities including in-memory stores and a mock extractor.
//!
//! These are useful for testing applications that use the extraction
//! library without a database or real AI calls.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::error::{ExtractError, Result};
use crate::providers::{ExtractorRequest, PosterExtractor, Provider};
use crate::service::extracted_payload;
use crate::stores::{EventStore, PostStore, RunStore, SettingScope, SettingsStore};
use crate::types::{ExtractionOutcome, NewEvent, StoredPost, SyntheticRun};

/// In-memory implementation of every store trait the service needs.
///
/// One struct on purpose: tests wire a single `Arc<MemoryStores>` into
/// the service and inspect all state through it afterwards.
#[derive(Default)]
pub struct MemoryStores {
    posts: RwLock<HashMap<String, StoredPost>>,
    /// Events keyed by platform post id, one generation per key.
    events: RwLock<HashMap<String, Vec<NewEvent>>>,
    runs: RwLock<Vec<SyntheticRun>>,
    settings: RwLock<HashMap<(SettingScope, String), String>>,
}

impl MemoryStores {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_post(&self, post: StoredPost) {
        self.posts.write().unwrap().insert(post.id.clone(), post);
    }

    pub fn set_setting(&self, scope: SettingScope, key: impl Into<String>, value: impl Into<String>) {
        self.settings
            .write()
            .unwrap()
            .insert((scope, key.into()), value.into());
    }

    /// The live event generation for a post.
    pub fn events_for(&self, platform_post_id: &str) -> Vec<NewEvent> {
        self.events
            .read()
            .unwrap()
            .get(platform_post_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn runs(&self) -> Vec<SyntheticRun> {
        self.runs.read().unwrap().clone()
    }

    pub fn post(&self, post_id: &str) -> Option<StoredPost> {
        self.posts.read().unwrap().get(post_id).cloned()
    }
}

#[async_trait]
impl PostStore for MemoryStores {
    async fn get_post(&self, post_id: &str) -> Result<Option<StoredPost>> {
        Ok(self.posts.read().unwrap().get(post_id).cloned())
    }

    async fn merge_raw(&self, post_id: &str, key: &str, value: &Value) -> Result<()> {
        let mut posts = self.posts.write().unwrap();
        let post = posts
            .get_mut(post_id)
            .ok_or_else(|| ExtractError::PostNotFound {
                post_id: post_id.to_string(),
            })?;
        match post.raw.as_object_mut() {
            Some(map) => {
                map.insert(key.to_string(), value.clone());
            }
            None => {
                post.raw = serde_json::json!({ key: value });
            }
        }
        Ok(())
    }

    async fn eligible_for_extraction(&self, account: Option<&str>) -> Result<Vec<StoredPost>> {
        let mut posts: Vec<StoredPost> = self
            .posts
            .read()
            .unwrap()
            .values()
            .filter(|p| p.is_poster == Some(true) && p.image_path.is_some())
            .filter(|p| extracted_payload(&p.raw).is_none())
            .filter(|p| account.is_none_or(|a| p.account == a))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        Ok(posts)
    }
}

#[async_trait]
impl EventStore for MemoryStores {
    async fn replace_for_post(&self, platform_post_id: &str, events: &[NewEvent]) -> Result<()> {
        self.events
            .write()
            .unwrap()
            .insert(platform_post_id.to_string(), events.to_vec());
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStores {
    async fn insert_run(&self, run: &SyntheticRun) -> Result<()> {
        self.runs.write().unwrap().push(run.clone());
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStores {
    async fn get_setting(&self, scope: SettingScope, key: &str) -> Result<Option<String>> {
        Ok(self
            .settings
            .read()
            .unwrap()
            .get(&(scope, key.to_string()))
            .cloned())
    }
}

/// Record of a call made to the mock extractor.
#[derive(Debug, Clone)]
pub struct MockExtractorCall {
    pub image_len: usize,
    pub mime: String,
    pub caption: Option<String>,
    pub posted_at: DateTime<Utc>,
    /// Exposed so tests can assert which key resolution won.
    pub api_key: String,
    pub model: Option<String>,
}

/// A mock extractor returning a canned outcome.
#[derive(Clone)]
pub struct MockExtractor {
    provider: Provider,
    outcome: Arc<RwLock<ExtractionOutcome>>,
    fail_with: Arc<RwLock<Option<String>>>,
    calls: Arc<RwLock<Vec<MockExtractorCall>>>,
}

impl MockExtractor {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            outcome: Arc::new(RwLock::new(ExtractionOutcome::default())),
            fail_with: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Canned outcome returned by every call.
    pub fn with_outcome(self, outcome: ExtractionOutcome) -> Self {
        *self.outcome.write().unwrap() = outcome;
        self
    }

    /// Make every call fail as a provider error.
    pub fn with_provider_error(self, message: impl Into<String>) -> Self {
        *self.fail_with.write().unwrap() = Some(message.into());
        self
    }

    /// Swap the canned outcome mid-test.
    pub fn set_outcome(&self, outcome: ExtractionOutcome) {
        *self.outcome.write().unwrap() = outcome;
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    pub fn calls(&self) -> Vec<MockExtractorCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl PosterExtractor for MockExtractor {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn extract(&self, request: &ExtractorRequest<'_>) -> Result<ExtractionOutcome> {
        self.calls.write().unwrap().push(MockExtractorCall {
            image_len: request.image.len(),
            mime: request.mime.to_string(),
            caption: request.caption.map(str::to_string),
            posted_at: request.posted_at,
            api_key: request.api_key.expose_secret().to_string(),
            model: request.model.map(str::to_string),
        });

        if let Some(message) = self.fail_with.read().unwrap().as_ref() {
            return Err(ExtractError::Provider(message.clone()));
        }
        Ok(self.outcome.read().unwrap().clone())
    }
}
