//! Integration tests for the extraction service against in-memory
//! stores and a mock extractor.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use extraction::providers::{Provider, ProviderRegistry};
use extraction::service::{event_fingerprint, ExtractionService};
use extraction::stores::SettingScope;
use extraction::testing::{MemoryStores, MockExtractor};
use extraction::types::{
    BulkFilter, DraftEvent, ExtractOptions, ExtractionOutcome, StoredPost,
};
use extraction::ExtractError;

fn temp_image(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("poster-{}-{}.jpg", tag, uuid::Uuid::new_v4()));
    std::fs::write(&path, b"not a real jpeg").unwrap();
    path
}

fn poster_post(id: &str, account: &str) -> StoredPost {
    StoredPost {
        id: id.to_string(),
        platform_post_id: format!("pp-{id}"),
        account: account.to_string(),
        caption: Some("this friday at the hall".to_string()),
        permalink: Some(format!("https://www.instagram.com/p/pp-{id}/")),
        image_path: Some(temp_image(id)),
        image_url: Some(format!("https://cdn.example.com/{id}.jpg")),
        is_poster: Some(true),
        raw: serde_json::json!({
            "timestamp": "2026-04-01T18:00:00Z",
            "ownerUsername": account,
        }),
        scraped_at: Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).unwrap(),
    }
}

fn draft(title: &str, date: Option<&str>) -> DraftEvent {
    DraftEvent {
        title: title.to_string(),
        start_date: date.map(|d| d.parse::<NaiveDate>().unwrap()),
        start_time: Some("19:00".to_string()),
        ..DraftEvent::default()
    }
}

fn outcome_with(drafts: Vec<DraftEvent>) -> ExtractionOutcome {
    ExtractionOutcome {
        events: drafts,
        classification: None,
        confidence: Some(0.9),
    }
}

fn service_with(stores: &Arc<MemoryStores>, mock: MockExtractor) -> ExtractionService {
    stores.set_setting(SettingScope::Global, "openai_api_key", "global-key");
    let registry = ProviderRegistry::new(Provider::OpenAi).register(Arc::new(mock));
    ExtractionService::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        stores.clone(),
        registry,
    )
}

#[tokio::test]
async fn extraction_merges_output_and_materializes_events() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    let mock = MockExtractor::new(Provider::OpenAi).with_outcome(outcome_with(vec![
        draft("Open Mic", Some("2026-04-03")),
        draft("Trivia Night", Some("2026-04-04")),
    ]));
    let service = service_with(&stores, mock);

    let outcome = service
        .extract(
            "p1",
            ExtractOptions {
                overwrite: false,
                create_events: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.events.len(), 2);

    // output landed under its own key without clobbering the rest
    let post = stores.post("p1").unwrap();
    assert_eq!(post.raw["ownerUsername"], "venue_a");
    assert_eq!(post.raw["extraction"]["events"].as_array().unwrap().len(), 2);
    assert_eq!(post.raw["extraction"]["provider"], "openai");

    let events = stores.events_for("pp-p1");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].title, "Open Mic");
    // draft gaps are filled from the post itself
    assert_eq!(
        events[0].image_url.as_deref(),
        Some("https://cdn.example.com/p1.jpg")
    );
    assert_eq!(
        events[0].source_url.as_deref(),
        Some("https://www.instagram.com/p/pp-p1/")
    );

    let runs = stores.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger, "manual-extraction");
    assert_eq!(events[0].run_id, runs[0].id);
}

#[tokio::test]
async fn second_extraction_conflicts_and_carries_the_existing_payload() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    let mock = MockExtractor::new(Provider::OpenAi)
        .with_outcome(outcome_with(vec![draft("Open Mic", Some("2026-04-03"))]));
    let service = service_with(&stores, mock.clone());

    let options = ExtractOptions {
        overwrite: false,
        create_events: true,
    };
    service.extract("p1", options).await.unwrap();

    let err = service.extract("p1", options).await.unwrap_err();
    match err {
        ExtractError::AlreadyExtracted { post_id, existing } => {
            assert_eq!(post_id, "p1");
            assert_eq!(existing["events"].as_array().unwrap().len(), 1);
        }
        other => panic!("expected conflict, got {other}"),
    }

    // conflict short-circuits before the provider is ever called again
    assert_eq!(mock.call_count(), 1);
    assert_eq!(stores.events_for("pp-p1").len(), 1);
}

#[tokio::test]
async fn overwrite_replaces_the_event_generation_instead_of_accumulating() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    let mock = MockExtractor::new(Provider::OpenAi).with_outcome(outcome_with(vec![
        draft("Open Mic", Some("2026-04-03")),
        draft("Trivia Night", Some("2026-04-04")),
    ]));
    let service = service_with(&stores, mock.clone());

    service
        .extract(
            "p1",
            ExtractOptions {
                overwrite: false,
                create_events: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(stores.events_for("pp-p1").len(), 2);

    mock.set_outcome(outcome_with(vec![
        draft("Open Mic", Some("2026-04-03")),
        draft("Trivia Night", Some("2026-04-04")),
        draft("Book Club", Some("2026-04-05")),
    ]));
    service
        .extract(
            "p1",
            ExtractOptions {
                overwrite: true,
                create_events: true,
            },
        )
        .await
        .unwrap();

    // three live events, never five
    assert_eq!(stores.events_for("pp-p1").len(), 3);
    // each materialization leaves its own audit run
    assert_eq!(stores.runs().len(), 2);
}

#[tokio::test]
async fn empty_prior_events_do_not_block_extraction() {
    let stores = MemoryStores::new();
    let mut post = poster_post("p1", "venue_a");
    post.raw = serde_json::json!({ "events": [] });
    stores.insert_post(post);
    let mock = MockExtractor::new(Provider::OpenAi)
        .with_outcome(outcome_with(vec![draft("Open Mic", Some("2026-04-03"))]));
    let service = service_with(&stores, mock);

    let outcome = service
        .extract("p1", ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.events.len(), 1);
}

#[tokio::test]
async fn posted_at_prefers_the_nested_metadata_timestamp() {
    let stores = MemoryStores::new();
    let mut post = poster_post("p1", "venue_a");
    post.raw = serde_json::json!({
        "metadata": { "timestamp": "2026-03-10T08:00:00Z" },
        "timestamp": "2025-12-31T00:00:00Z",
    });
    stores.insert_post(post);
    let mock = MockExtractor::new(Provider::OpenAi).with_outcome(ExtractionOutcome::default());
    let service = service_with(&stores, mock.clone());

    service
        .extract("p1", ExtractOptions::default())
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(
        calls[0].posted_at,
        Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap()
    );
    assert_eq!(calls[0].caption.as_deref(), Some("this friday at the hall"));
}

#[tokio::test]
async fn missing_image_is_reported_before_any_provider_call() {
    let stores = MemoryStores::new();
    let mut post = poster_post("p1", "venue_a");
    post.image_path = None;
    stores.insert_post(post);
    let mock = MockExtractor::new(Provider::OpenAi);
    let service = service_with(&stores, mock.clone());

    let err = service
        .extract("p1", ExtractOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "image_unavailable");
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn unknown_post_is_not_found() {
    let stores = MemoryStores::new();
    let service = service_with(&stores, MockExtractor::new(Provider::OpenAi));

    let err = service
        .extract("nope", ExtractOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "post_not_found");
}

#[tokio::test]
async fn drafts_without_a_start_date_are_skipped_at_materialization() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    let mock = MockExtractor::new(Provider::OpenAi).with_outcome(outcome_with(vec![
        draft("Dated", Some("2026-04-03")),
        draft("Dateless", None),
    ]));
    let service = service_with(&stores, mock);

    let outcome = service
        .extract(
            "p1",
            ExtractOptions {
                overwrite: false,
                create_events: true,
            },
        )
        .await
        .unwrap();

    // the raw output keeps both drafts; only the dated one persists
    assert_eq!(outcome.events.len(), 2);
    let events = stores.events_for("pp-p1");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Dated");
    assert_eq!(
        events[0].fingerprint,
        event_fingerprint("pp-p1", 0, "Dated")
    );
}

#[tokio::test]
async fn feature_scope_beats_global_scope_for_credentials() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    stores.set_setting(SettingScope::Feature, "openai_api_key", "feature-key");
    stores.set_setting(SettingScope::Feature, "extraction_model", "gpt-4o-mini");
    let mock = MockExtractor::new(Provider::OpenAi).with_outcome(ExtractionOutcome::default());
    // service_with sets the global key, which must lose here
    let service = service_with(&stores, mock.clone());

    service
        .extract("p1", ExtractOptions::default())
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls[0].api_key, "feature-key");
    assert_eq!(calls[0].model.as_deref(), Some("gpt-4o-mini"));
}

#[tokio::test]
async fn environment_is_the_last_resort_for_credentials() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    stores.set_setting(SettingScope::Global, "ai_provider", "anthropic");
    std::env::set_var("ANTHROPIC_API_KEY", "env-key");
    let mock =
        MockExtractor::new(Provider::Anthropic).with_outcome(ExtractionOutcome::default());
    let registry = ProviderRegistry::new(Provider::OpenAi).register(Arc::new(mock.clone()));
    let service = ExtractionService::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        stores.clone(),
        registry,
    );

    service
        .extract("p1", ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(mock.calls()[0].api_key, "env-key");
}

#[tokio::test]
async fn missing_credentials_are_a_config_error() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    // no stored key, no environment fallback
    std::env::remove_var("EXAMPLE_NOWHERE_KEY");
    let mock = MockExtractor::new(Provider::OpenAi);
    let registry = ProviderRegistry::new(Provider::OpenAi).register(Arc::new(mock.clone()));
    let service = ExtractionService::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        stores.clone(),
        registry,
    );

    // only meaningful when the ambient environment carries no real key
    if std::env::var("OPENAI_API_KEY").is_err() {
        let err = service
            .extract("p1", ExtractOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "config");
        assert_eq!(mock.call_count(), 0);
    }
}

#[tokio::test]
async fn bulk_extraction_honors_the_limit() {
    let stores = MemoryStores::new();
    for i in 0..10 {
        stores.insert_post(poster_post(&format!("p{i}"), "venue_a"));
    }
    let mock = MockExtractor::new(Provider::OpenAi)
        .with_outcome(outcome_with(vec![draft("Show", Some("2026-04-03"))]));
    let service = service_with(&stores, mock.clone());

    let report = service
        .extract_many(BulkFilter {
            account: None,
            limit: Some(3),
            overwrite: false,
        })
        .await
        .unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn bulk_extraction_filters_by_account_and_skips_extracted_posts() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    stores.insert_post(poster_post("p2", "venue_b"));
    let mut done = poster_post("p3", "venue_a");
    done.raw = serde_json::json!({
        "extraction": { "events": [{"title": "old"}] }
    });
    stores.insert_post(done);

    let mock = MockExtractor::new(Provider::OpenAi)
        .with_outcome(outcome_with(vec![draft("Show", Some("2026-04-03"))]));
    let service = service_with(&stores, mock);

    let report = service
        .extract_many(BulkFilter {
            account: Some("venue_a".to_string()),
            ..BulkFilter::default()
        })
        .await
        .unwrap();

    assert_eq!(report.attempted, 1);
    assert_eq!(report.outcomes[0].post_id, "p1");
}

#[tokio::test]
async fn memory_store_eligibility_excludes_already_extracted_posts() {
    use extraction::stores::PostStore;

    let stores = MemoryStores::new();
    stores.insert_post(poster_post("fresh", "venue_a"));

    let mut extracted = poster_post("done", "venue_a");
    extracted.raw = serde_json::json!({
        "extraction": { "events": [{"title": "old"}] }
    });
    stores.insert_post(extracted);

    let mut no_image = poster_post("no-image", "venue_a");
    no_image.image_path = None;
    stores.insert_post(no_image);

    let mut not_poster = poster_post("not-poster", "venue_a");
    not_poster.is_poster = Some(false);
    stores.insert_post(not_poster);

    let eligible = stores.eligible_for_extraction(None).await.unwrap();
    let ids: Vec<&str> = eligible.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["fresh"]);
}

#[tokio::test]
async fn one_failing_post_does_not_abort_the_bulk_run() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    let mut broken = poster_post("p2", "venue_a");
    broken.image_path = Some(PathBuf::from("/nonexistent/poster.jpg"));
    // newest-first ordering puts the broken post first
    broken.scraped_at = Utc.with_ymd_and_hms(2026, 4, 3, 9, 0, 0).unwrap();
    stores.insert_post(broken);

    let mock = MockExtractor::new(Provider::OpenAi)
        .with_outcome(outcome_with(vec![draft("Show", Some("2026-04-03"))]));
    let service = service_with(&stores, mock);

    let report = service
        .extract_many(BulkFilter::default())
        .await
        .unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    let failed = report
        .outcomes
        .iter()
        .find(|o| o.post_id == "p2")
        .unwrap();
    assert!(failed.result.is_err());
    assert_eq!(stores.events_for("pp-p1").len(), 1);
}

#[tokio::test]
async fn provider_failure_surfaces_without_writing_anything() {
    let stores = MemoryStores::new();
    stores.insert_post(poster_post("p1", "venue_a"));
    let mock = MockExtractor::new(Provider::OpenAi).with_provider_error("rate limited");
    let service = service_with(&stores, mock);

    let err = service
        .extract(
            "p1",
            ExtractOptions {
                overwrite: false,
                create_events: true,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "provider");
    let post = stores.post("p1").unwrap();
    assert!(post.raw.get("extraction").is_none());
    assert!(stores.events_for("pp-p1").is_empty());
    assert!(stores.runs().is_empty());
}
