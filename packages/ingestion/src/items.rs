//! Shape classification for heterogeneous actor dataset items.
//!
//! Different actor versions emit either "nested" items (one object per
//! profile carrying a `latestPosts` list) or "flat" items (one object per
//! post). Instead of probing fields ad hoc, every item is classified into
//! an explicit sum type up front; anything unrecognizable is dropped by
//! the caller.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::types::{Account, RawPost};

/// One dataset item, classified by shape.
#[derive(Debug, Clone)]
pub enum ActorItem {
    /// A profile object with an embedded list of post objects.
    Nested(NestedProfile),
    /// The item is itself a single post.
    Flat(FlatPost),
    /// Neither shape deserialized; the item is dropped.
    Unrecognized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestedProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "inputUrl", default)]
    pub input_url: Option<String>,
    #[serde(rename = "latestPosts", default)]
    pub latest_posts: Vec<FlatPost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlatPost {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "shortCode", default)]
    pub short_code: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(rename = "displayUrl", default)]
    pub display_url: Option<String>,
    #[serde(rename = "videoUrl", default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "ownerUsername", default)]
    pub owner_username: Option<String>,
    #[serde(rename = "inputUrl", default)]
    pub input_url: Option<String>,
}

impl FlatPost {
    /// The immutable platform post id. Short codes are preferred because
    /// older actor versions recycle numeric ids across media types.
    pub fn post_id(&self) -> Option<&str> {
        self.short_code.as_deref().or(self.id.as_deref())
    }

    pub fn into_raw_post(self, account: &str, scraped_at: DateTime<Utc>) -> Option<RawPost> {
        let post_id = self.post_id()?.to_string();
        Some(RawPost {
            post_id,
            caption: self.caption,
            display_url: self.display_url,
            video_url: self.video_url,
            permalink: self.url,
            timestamp: self.timestamp,
            account: account.to_string(),
            scraped_at,
        })
    }
}

/// Classify a raw dataset item.
pub fn classify(value: &Value) -> ActorItem {
    if value.get("latestPosts").map_or(false, Value::is_array) {
        return match serde_json::from_value::<NestedProfile>(value.clone()) {
            Ok(profile) => ActorItem::Nested(profile),
            Err(_) => ActorItem::Unrecognized,
        };
    }
    if value.get("id").is_some() || value.get("shortCode").is_some() || value.get("url").is_some()
    {
        return match serde_json::from_value::<FlatPost>(value.clone()) {
            Ok(post) => ActorItem::Flat(post),
            Err(_) => ActorItem::Unrecognized,
        };
    }
    ActorItem::Unrecognized
}

/// Resolve which requested account an item belongs to, from the explicit
/// owner field or by matching the original request's input URL.
pub fn resolve_account<'a>(
    accounts: &'a [Account],
    owner: Option<&str>,
    input_url: Option<&str>,
) -> Option<&'a Account> {
    if let Some(owner) = owner {
        let owner = owner.trim_start_matches('@');
        if let Some(account) = accounts
            .iter()
            .find(|a| a.handle.eq_ignore_ascii_case(owner))
        {
            return Some(account);
        }
    }
    if let Some(url) = input_url {
        let normalized = url.trim_end_matches('/');
        if let Some(account) = accounts.iter().find(|a| {
            a.profile_url().trim_end_matches('/') == normalized
                || normalized.ends_with(&format!("/{}", a.handle))
        }) {
            return Some(account);
        }
    }
    None
}
