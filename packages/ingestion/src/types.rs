use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::transport::TransportKind;

/// A tracked external account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Bare handle, no leading `@`.
    pub handle: String,

    /// Post ids already ingested for this account. Append-only: ids are
    /// added after each successful fetch, never removed.
    #[serde(default)]
    pub known_post_ids: HashSet<String>,

    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into().trim_start_matches('@').to_string(),
            known_post_ids: HashSet::new(),
            last_checked_at: None,
        }
    }

    pub fn with_known_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_post_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// The profile URL sent to the actor as a direct URL target.
    pub fn profile_url(&self) -> String {
        format!("https://www.instagram.com/{}/", self.handle)
    }
}

/// A freshly scraped post, before it is handed to the external post store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    /// Immutable platform post id (short code).
    pub post_id: String,
    pub caption: Option<String>,
    pub display_url: Option<String>,
    pub video_url: Option<String>,
    pub permalink: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Handle of the owning account.
    pub account: String,
    pub scraped_at: DateTime<Utc>,
}

/// Per-account result of a batched fetch.
pub type AccountResult = std::result::Result<Vec<RawPost>, IngestError>;

/// Result of `BatchActorRunner::fetch_posts`: one entry per requested
/// account, each either its posts (newest-first) or its own error. A
/// failure for one account never affects its siblings.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub accounts: BTreeMap<String, AccountResult>,
}

impl FetchReport {
    pub fn posts(&self, handle: &str) -> Option<&[RawPost]> {
        match self.accounts.get(handle) {
            Some(Ok(posts)) => Some(posts.as_slice()),
            _ => None,
        }
    }

    pub fn error(&self, handle: &str) -> Option<&IngestError> {
        match self.accounts.get(handle) {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    pub fn ok_count(&self) -> usize {
        self.accounts.values().filter(|r| r.is_ok()).count()
    }

    pub fn err_count(&self) -> usize {
        self.accounts.values().filter(|r| r.is_err()).count()
    }

    pub fn total_posts(&self) -> usize {
        self.accounts
            .values()
            .filter_map(|r| r.as_ref().ok())
            .map(|p| p.len())
            .sum()
    }
}

/// Result of the diagnostic single-account fetch, reporting which
/// transport actually served the request.
#[derive(Debug)]
pub struct SingleFetch {
    pub posts: Vec<RawPost>,
    pub served_by: TransportKind,
}
