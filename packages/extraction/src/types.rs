//! Data types for poster extraction.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A post as held by the external post store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPost {
    /// Store-local id.
    pub id: String,
    /// Immutable platform post id (short code). Materialized events are
    /// keyed by this.
    pub platform_post_id: String,
    pub account: String,
    pub caption: Option<String>,
    pub permalink: Option<String>,
    /// Path of the downloaded image, if the download succeeded.
    pub image_path: Option<PathBuf>,
    pub image_url: Option<String>,
    /// Poster classification from ingestion, if any.
    pub is_poster: Option<bool>,
    /// Raw scraped payload. Extraction output is merged in under its
    /// own key, never replacing unrelated data.
    pub raw: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

/// An AI-extracted, not-yet-persisted candidate event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Time of day as printed on the poster, parsed leniently later
    /// ("19:00", "7:00 PM", "7pm").
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub venue_address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub organizer: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub registration_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Whether the image depicts an event poster, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosterClassification {
    pub is_poster: bool,
    pub confidence: f32,
    #[serde(default)]
    pub cues: Vec<String>,
}

/// What an extractor returns for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub events: Vec<DraftEvent>,
    #[serde(default)]
    pub classification: Option<PosterClassification>,
    /// Overall extraction confidence, when the provider reports one.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Canonical materialized event, ready for the external event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Stable natural key: hash of platform post id, draft index, and
    /// normalized title. Identical across retries of the same
    /// extraction, so a replace is idempotent.
    pub fingerprint: String,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub timezone: String,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub city: Option<String>,
    pub organizer: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
    pub tags: Vec<String>,
    pub contact: Option<String>,
    pub registration_url: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub account: String,
    pub platform_post_id: String,
    /// The synthetic run this generation belongs to.
    pub run_id: String,
}

/// Audit record for one manual extraction, inserted alongside the
/// events it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticRun {
    pub id: String,
    pub trigger: String,
    pub status: String,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

impl SyntheticRun {
    pub fn manual_extraction(item_count: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trigger: "manual-extraction".to_string(),
            status: "succeeded".to_string(),
            item_count,
            created_at: Utc::now(),
        }
    }
}

/// Options for a single extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Replace existing extraction output instead of failing with a
    /// conflict.
    pub overwrite: bool,
    /// Materialize persisted events from the returned drafts.
    pub create_events: bool,
}

/// Selection for bulk extraction.
#[derive(Debug, Clone, Default)]
pub struct BulkFilter {
    pub account: Option<String>,
    pub limit: Option<usize>,
    pub overwrite: bool,
}

/// Per-post outcome of a bulk run.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub post_id: String,
    /// Number of draft events on success, error text on failure.
    pub result: std::result::Result<usize, String>,
}

/// Aggregate report of a bulk run.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<BulkOutcome>,
}

/// Parse a poster-style time of day.
///
/// Accepts 24h ("19:00", "19:00:00") and 12h ("7:00 PM", "7pm") forms.
pub fn parse_event_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    for format in ["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M%p", "%I %p", "%I%p"] {
        if let Ok(time) = NaiveTime::parse_from_str(&raw.to_uppercase(), format) {
            return Some(time);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_poster_times() {
        assert_eq!(
            parse_event_time("19:00"),
            NaiveTime::from_hms_opt(19, 0, 0)
        );
        assert_eq!(
            parse_event_time("7:30 pm"),
            NaiveTime::from_hms_opt(19, 30, 0)
        );
        assert_eq!(parse_event_time("7pm"), NaiveTime::from_hms_opt(19, 0, 0));
        assert_eq!(parse_event_time("doors at dusk"), None);
    }

    #[test]
    fn draft_event_tolerates_sparse_json() {
        let draft: DraftEvent =
            serde_json::from_str(r#"{"title": "Open Mic Night"}"#).unwrap();
        assert_eq!(draft.title, "Open Mic Night");
        assert!(draft.start_date.is_none());
        assert!(draft.tags.is_empty());
    }
}
