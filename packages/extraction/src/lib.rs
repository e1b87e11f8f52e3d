//! AI poster extraction for scraped social posts.
//!
//! Turns a post's downloaded image (plus caption and timestamp context)
//! into structured draft events through a pluggable AI provider, then
//! materializes them as persisted events keyed to the post.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use extraction::providers::{Provider, ProviderRegistry};
//! use extraction::service::ExtractionService;
//! use extraction::testing::{MemoryStores, MockExtractor};
//! use extraction::types::ExtractOptions;
//!
//! # async fn example() -> extraction::error::Result<()> {
//! let stores = MemoryStores::new();
//! let registry = ProviderRegistry::new(Provider::OpenAi)
//!     .register(Arc::new(MockExtractor::new(Provider::OpenAi)));
//!
//! let service = ExtractionService::new(
//!     stores.clone(),
//!     stores.clone(),
//!     stores.clone(),
//!     stores.clone(),
//!     registry,
//! );
//!
//! let outcome = service
//!     .extract("post-1", ExtractOptions { overwrite: false, create_events: true })
//!     .await?;
//! println!("extracted {} events", outcome.events.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod providers;
pub mod service;
pub mod stores;
pub mod testing;
pub mod types;

pub use error::{ExtractError, Result};
pub use providers::{
    AnthropicExtractor, ExtractorRequest, OpenAiExtractor, PosterExtractor, Provider,
    ProviderRegistry, ResolvedProvider,
};
pub use service::{ExtractionService, ServiceConfig, EXTRACTION_KEY};
pub use stores::{EventStore, PostStore, RunStore, SettingScope, SettingsStore};
pub use types::{
    BulkFilter, BulkOutcome, BulkReport, DraftEvent, ExtractOptions, ExtractionOutcome, NewEvent,
    PosterClassification, StoredPost, SyntheticRun,
};
