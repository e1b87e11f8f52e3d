//! The extraction service: idempotent poster extraction and event
//! materialization over external stores.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{ExtractError, Result};
use crate::providers::{ExtractorRequest, ProviderRegistry};
use crate::stores::{EventStore, PostStore, RunStore, SettingsStore};
use crate::types::{
    parse_event_time, BulkFilter, BulkOutcome, BulkReport, DraftEvent, ExtractOptions,
    ExtractionOutcome, NewEvent, StoredPost, SyntheticRun,
};

/// Key under which extraction output is merged into a post's raw
/// payload.
pub const EXTRACTION_KEY: &str = "extraction";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Timezone label stored on materialized events when the draft
    /// carries none.
    pub default_timezone: String,
    /// Offset used to anchor poster-local date+time to UTC.
    pub default_offset: FixedOffset,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_timezone: "America/Chicago".to_string(),
            // CST; a fixed offset is enough for poster-local anchoring
            default_offset: FixedOffset::west_opt(6 * 3600).expect("static offset"),
        }
    }
}

/// High-level extraction service.
///
/// All collaborators are trait objects so tests can swap in the
/// in-memory stores and mock extractor from [`crate::testing`].
pub struct ExtractionService {
    posts: Arc<dyn PostStore>,
    events: Arc<dyn EventStore>,
    runs: Arc<dyn RunStore>,
    settings: Arc<dyn SettingsStore>,
    registry: ProviderRegistry,
    config: ServiceConfig,
}

impl ExtractionService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        events: Arc<dyn EventStore>,
        runs: Arc<dyn RunStore>,
        settings: Arc<dyn SettingsStore>,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            posts,
            events,
            runs,
            settings,
            registry,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Extract structured events from one post's poster image.
    ///
    /// Fails with `AlreadyExtracted` (carrying the existing payload)
    /// when the post has non-empty extraction output and `overwrite` is
    /// not set. With `create_events`, materializes exactly one
    /// generation of persisted events for the post.
    pub async fn extract(
        &self,
        post_id: &str,
        options: ExtractOptions,
    ) -> Result<ExtractionOutcome> {
        let post = self
            .posts
            .get_post(post_id)
            .await?
            .ok_or_else(|| ExtractError::PostNotFound {
                post_id: post_id.to_string(),
            })?;

        let image_path = post
            .image_path
            .clone()
            .ok_or_else(|| ExtractError::ImageUnavailable {
                post_id: post_id.to_string(),
            })?;

        if !options.overwrite {
            if let Some(existing) = extracted_payload(&post.raw) {
                return Err(ExtractError::AlreadyExtracted {
                    post_id: post_id.to_string(),
                    existing,
                });
            }
        }

        let posted_at = resolve_posted_at(&post);
        let resolved = self.registry.resolve(self.settings.as_ref()).await?;

        let image =
            tokio::fs::read(&image_path)
                .await
                .map_err(|_| ExtractError::ImageUnavailable {
                    post_id: post_id.to_string(),
                })?;

        tracing::info!(
            post_id,
            provider = %resolved.provider,
            image_bytes = image.len(),
            "Extracting poster"
        );

        let request = ExtractorRequest {
            image: &image,
            mime: mime_for_path(&image_path),
            caption: post.caption.as_deref(),
            posted_at,
            api_key: &resolved.api_key,
            model: resolved.model.as_deref(),
        };
        let outcome = resolved.extractor.extract(&request).await?;

        // Merge under the dedicated key so unrelated raw data survives.
        let payload = serde_json::json!({
            "events": outcome.events,
            "classification": outcome.classification,
            "confidence": outcome.confidence,
            "provider": resolved.provider.as_str(),
            "model": resolved.model,
            "extracted_at": Utc::now(),
        });
        self.posts
            .merge_raw(post_id, EXTRACTION_KEY, &payload)
            .await?;

        if options.create_events && !outcome.events.is_empty() {
            self.materialize(&post, &outcome.events).await?;
        }

        Ok(outcome)
    }

    /// Extract every eligible post, strictly sequentially.
    ///
    /// Sequential on purpose: provider rate limits. Per-post failures
    /// are recorded and never abort the remaining items.
    pub async fn extract_many(&self, filter: BulkFilter) -> Result<BulkReport> {
        let eligible = self
            .posts
            .eligible_for_extraction(filter.account.as_deref())
            .await?;

        let selected: Vec<StoredPost> = eligible
            .into_iter()
            .filter(|p| extracted_payload(&p.raw).is_none())
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        tracing::info!(
            selected = selected.len(),
            account = filter.account.as_deref().unwrap_or("*"),
            "Starting bulk extraction"
        );

        let mut report = BulkReport::default();
        for post in selected {
            report.attempted += 1;
            let result = self
                .extract(
                    &post.id,
                    ExtractOptions {
                        overwrite: filter.overwrite,
                        create_events: true,
                    },
                )
                .await;

            match result {
                Ok(outcome) => {
                    report.succeeded += 1;
                    report.outcomes.push(BulkOutcome {
                        post_id: post.id,
                        result: Ok(outcome.events.len()),
                    });
                }
                Err(err) => {
                    tracing::warn!(post_id = %post.id, error = %err, "Bulk extraction item failed");
                    report.failed += 1;
                    report.outcomes.push(BulkOutcome {
                        post_id: post.id,
                        result: Err(err.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Bulk extraction finished"
        );
        Ok(report)
    }

    /// Materialize one generation of events for the post: insert the
    /// synthetic audit run, then swap the post's events in one store
    /// call.
    async fn materialize(&self, post: &StoredPost, drafts: &[DraftEvent]) -> Result<()> {
        let run = SyntheticRun::manual_extraction(drafts.len());

        let mut events = Vec::new();
        for (index, draft) in drafts.iter().enumerate() {
            match self.normalize_draft(post, draft, index, &run.id) {
                Some(event) => events.push(event),
                None => {
                    tracing::warn!(title = %draft.title, "Skipping draft without a start date")
                }
            }
        }

        self.runs.insert_run(&run).await?;
        self.events
            .replace_for_post(&post.platform_post_id, &events)
            .await?;

        tracing::info!(
            platform_post_id = %post.platform_post_id,
            run_id = %run.id,
            events = events.len(),
            "Materialized events"
        );
        Ok(())
    }

    /// Normalize a draft into the canonical event shape. Drafts without
    /// a start date cannot become events.
    fn normalize_draft(
        &self,
        post: &StoredPost,
        draft: &DraftEvent,
        index: usize,
        run_id: &str,
    ) -> Option<NewEvent> {
        let start_date = draft.start_date?;
        let start_time = draft
            .start_time
            .as_deref()
            .and_then(parse_event_time)
            .unwrap_or(NaiveTime::MIN);
        let starts_at = self.anchor(start_date.and_time(start_time));

        let ends_at = match (draft.end_date, draft.end_time.as_deref()) {
            (None, None) => None,
            (date, time) => {
                let end_time = time.and_then(parse_event_time).unwrap_or(NaiveTime::MIN);
                Some(self.anchor(date.unwrap_or(start_date).and_time(end_time)))
            }
        };

        Some(NewEvent {
            fingerprint: event_fingerprint(&post.platform_post_id, index, &draft.title),
            title: draft.title.clone(),
            description: draft.description.clone(),
            starts_at,
            ends_at,
            timezone: draft
                .timezone
                .clone()
                .unwrap_or_else(|| self.config.default_timezone.clone()),
            venue_name: draft.venue_name.clone(),
            venue_address: draft.venue_address.clone(),
            city: draft.city.clone(),
            organizer: draft.organizer.clone(),
            category: draft.category.clone(),
            price: draft.price.clone(),
            tags: draft.tags.clone(),
            contact: draft.contact.clone(),
            registration_url: draft.registration_url.clone(),
            // the post's own image and permalink fill draft gaps
            image_url: draft.image_url.clone().or_else(|| post.image_url.clone()),
            source_url: draft.url.clone().or_else(|| post.permalink.clone()),
            account: post.account.clone(),
            platform_post_id: post.platform_post_id.clone(),
            run_id: run_id.to_string(),
        })
    }

    fn anchor(&self, naive: chrono::NaiveDateTime) -> DateTime<Utc> {
        self.config
            .default_offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

/// The post's existing extraction payload, if it has a non-empty one.
///
/// An empty `events` array does not count: a prior run that found
/// nothing leaves the post eligible for extraction without `overwrite`.
pub fn extracted_payload(raw: &Value) -> Option<Value> {
    if let Some(extraction) = raw.get(EXTRACTION_KEY) {
        if extraction
            .get("events")
            .and_then(Value::as_array)
            .is_some_and(|events| !events.is_empty())
        {
            return Some(extraction.clone());
        }
    }
    // legacy flat layout
    if let Some(events) = raw.get("events").and_then(Value::as_array) {
        if !events.is_empty() {
            return Some(serde_json::json!({ "events": events }));
        }
    }
    None
}

/// Resolve the authoritative posted-at time for anchoring relative
/// dates: nested metadata timestamp, then the legacy flat field, then
/// the scrape time as a degraded fallback.
pub fn resolve_posted_at(post: &StoredPost) -> DateTime<Utc> {
    let nested = post
        .raw
        .pointer("/metadata/timestamp")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339);
    if let Some(timestamp) = nested {
        return timestamp;
    }
    if let Some(timestamp) = post
        .raw
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339)
    {
        return timestamp;
    }
    post.scraped_at
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Stable natural key for a materialized event: identical across
/// retries of the same extraction, distinct across drafts.
pub fn event_fingerprint(platform_post_id: &str, index: usize, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform_post_id.as_bytes());
    hasher.update([0]);
    hasher.update(index.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(title.trim().to_lowercase().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
