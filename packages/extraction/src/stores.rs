//! Collaborator store traits.
//!
//! The extraction service reads and writes through these focused traits;
//! the host application supplies the real implementations (its post,
//! event, run, and settings tables). The in-memory versions live in
//! [`crate::testing`].

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NewEvent, StoredPost, SyntheticRun};

/// Read/update access to the external post store.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Get a post by store-local id.
    async fn get_post(&self, post_id: &str) -> Result<Option<StoredPost>>;

    /// Merge `value` into the post's raw payload under `key`,
    /// preserving unrelated raw data.
    async fn merge_raw(&self, post_id: &str, key: &str, value: &serde_json::Value) -> Result<()>;

    /// Posts eligible for extraction: classified as poster, local image
    /// present, no extraction output yet. Newest-first, optionally
    /// filtered by account.
    async fn eligible_for_extraction(&self, account: Option<&str>) -> Result<Vec<StoredPost>>;
}

/// Write access to the external event store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Replace every event linked to `platform_post_id` with the given
    /// generation. One call, so implementations can make it a single
    /// transaction; at no point may two generations be live.
    async fn replace_for_post(
        &self,
        platform_post_id: &str,
        events: &[NewEvent],
    ) -> Result<()>;
}

/// Write access to the external run store (audit/lineage rows).
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert_run(&self, run: &SyntheticRun) -> Result<()>;
}

/// Scope of a stored setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingScope {
    /// Scoped to the extraction feature; wins over global.
    Feature,
    Global,
}

/// Read access to layered application settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, scope: SettingScope, key: &str) -> Result<Option<String>>;
}
