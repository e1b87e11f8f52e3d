use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for a profile-scrape actor run.
///
/// Targets are sent redundantly as profile URLs and bare handles; the
/// actor accepts either and some versions only read one of the two.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorInput {
    #[serde(rename = "directUrls", default)]
    pub direct_urls: Vec<String>,
    #[serde(rename = "username", default)]
    pub usernames: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

impl ActorInput {
    /// Build an input targeting the given handles.
    pub fn for_handles<I, S>(handles: I, results_limit: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let usernames: Vec<String> = handles
            .into_iter()
            .map(|h| h.as_ref().trim_start_matches('@').to_string())
            .collect();
        let direct_urls = usernames
            .iter()
            .map(|u| format!("https://www.instagram.com/{u}/"))
            .collect();
        Self {
            direct_urls,
            usernames,
            results_limit,
        }
    }
}

/// Lifecycle status of an actor run.
///
/// Statuses are monotonic; the terminal ones are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "ABORTING")]
    Aborting,
    #[serde(rename = "ABORTED")]
    Aborted,
    #[serde(rename = "TIMING-OUT")]
    TimingOut,
    #[serde(rename = "TIMED-OUT")]
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted | Self::TimedOut)
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorRun {
    pub id: String,
    pub status: RunStatus,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "defaultKeyValueStoreId")]
    pub default_key_value_store_id: Option<String>,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Wrapper for platform API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_sends_handles_and_urls() {
        let input = ActorInput::for_handles(["@venue_a", "venue_b"], 40);
        assert_eq!(input.usernames, vec!["venue_a", "venue_b"]);
        assert_eq!(input.direct_urls[0], "https://www.instagram.com/venue_a/");
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["resultsLimit"], 40);
        assert!(json["directUrls"].is_array());
        assert!(json["username"].is_array());
    }

    #[test]
    fn status_terminality() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::TimingOut.is_terminal());
        assert!(!RunStatus::Failed.is_success());
    }

    #[test]
    fn status_parses_platform_strings() {
        let s: RunStatus = serde_json::from_str("\"TIMED-OUT\"").unwrap();
        assert_eq!(s, RunStatus::TimedOut);
        let s: RunStatus = serde_json::from_str("\"SUCCEEDED\"").unwrap();
        assert!(s.is_success());
    }
}
