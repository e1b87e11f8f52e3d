//! Pure REST client for the actor scraping platform.
//!
//! Supports starting actor runs, polling for completion under a hard
//! deadline, paginating dataset results, and fetching the snapshot of an
//! already-finished run (its stored input plus dataset) for retroactive
//! imports.
//!
//! # Example
//!
//! ```rust,ignore
//! use actor_client::{ActorClient, ActorInput};
//!
//! let client = ActorClient::new("your-api-token".into());
//! let input = ActorInput::for_handles(["somevenue"], 50);
//! let items = client.run_to_completion(&input, 50).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{ActorError, Result};
pub use types::{ActorInput, ActorRun, RunStatus};

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use types::ApiResponse;

const DEFAULT_BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for the profile post scraper.
const POST_SCRAPER_ACTOR: &str = "nH2AHrwxeTRJoN5hX";

/// Dataset page size is clamped to this range by the platform.
const MIN_PAGE_SIZE: usize = 1;
const MAX_PAGE_SIZE: usize = 1000;
const DEFAULT_PAGE_SIZE: usize = 500;

pub struct ActorClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
    actor_id: String,
    poll_interval: Duration,
    poll_deadline: Duration,
    page_size: usize,
}

impl ActorClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
            actor_id: POST_SCRAPER_ACTOR.to_string(),
            poll_interval: Duration::from_secs(5),
            poll_deadline: Duration::from_secs(300),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set a custom base URL (proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the actor to invoke (default: profile post scraper).
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }

    /// Set the status poll interval (default: 5s).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the hard polling deadline (default: 5 minutes).
    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = deadline;
        self
    }

    /// Set the dataset page size. Clamped to 1..=1000.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn poll_deadline(&self) -> Duration {
        self.poll_deadline
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_run(&self, input: &ActorInput) -> Result<ActorRun> {
        let url = format!("{}/acts/{}/runs", self.base_url, self.actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<ActorRun> = Self::read_json(resp).await?;
        Ok(api_resp.data)
    }

    /// Fetch current metadata for a run.
    pub async fn get_run(&self, run_id: &str) -> Result<ActorRun> {
        let url = format!("{}/actor-runs/{}", self.base_url, run_id);
        let resp = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let api_resp: ApiResponse<ActorRun> = Self::read_json(resp).await?;
        Ok(api_resp.data)
    }

    /// Poll a run at a fixed interval until it reaches a terminal status.
    ///
    /// A failed/aborted/timed-out terminal status yields `RunFailed`;
    /// an elapsed poll deadline yields the distinct `PollTimeout`.
    pub async fn wait_for_finish(&self, run_id: &str) -> Result<ActorRun> {
        let started = Instant::now();
        loop {
            let run = self.get_run(run_id).await?;
            if run.status.is_success() {
                return Ok(run);
            }
            if run.status.is_terminal() {
                return Err(ActorError::RunFailed { status: run.status });
            }
            if started.elapsed() >= self.poll_deadline {
                return Err(ActorError::PollTimeout {
                    run_id: run_id.to_string(),
                    waited: started.elapsed(),
                });
            }
            tracing::debug!(run_id, status = ?run.status, "Run still in progress");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Fetch one page of dataset items.
    pub async fn dataset_items<T: DeserializeOwned>(
        &self,
        dataset_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<T>> {
        let limit = limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let url = format!(
            "{}/datasets/{}/items?format=json&offset={}&limit={}",
            self.base_url, dataset_id, offset, limit
        );
        let resp = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActorError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Paginate a dataset until exhausted or `want` items are collected.
    pub async fn collect_dataset(
        &self,
        dataset_id: &str,
        want: usize,
    ) -> Result<Vec<serde_json::Value>> {
        let mut items: Vec<serde_json::Value> = Vec::new();
        let mut offset = 0;
        loop {
            let page_size = self.page_size.min(want.saturating_sub(items.len()).max(1));
            let page: Vec<serde_json::Value> =
                self.dataset_items(dataset_id, offset, page_size).await?;
            let fetched = page.len();
            items.extend(page);
            if fetched < page_size || items.len() >= want {
                break;
            }
            offset += fetched;
        }
        tracing::debug!(dataset_id, count = items.len(), "Collected dataset items");
        Ok(items)
    }

    /// Fetch the stored INPUT record of a run's key-value store.
    ///
    /// Used by retroactive imports to reconstruct which accounts a
    /// finished run was asked for, without issuing a new invocation.
    pub async fn run_input(&self, key_value_store_id: &str) -> Result<ActorInput> {
        let url = format!(
            "{}/key-value-stores/{}/records/INPUT",
            self.base_url, key_value_store_id
        );
        let resp = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActorError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let input: ActorInput = resp.json().await?;
        Ok(input)
    }

    /// Run an actor end-to-end: start run, poll, paginate results.
    pub async fn run_to_completion(
        &self,
        input: &ActorInput,
        want: usize,
    ) -> Result<Vec<serde_json::Value>> {
        tracing::info!(
            handles = input.usernames.len(),
            limit = input.results_limit,
            "Starting actor run"
        );

        let run = self.start_run(input).await?;
        tracing::info!(run_id = %run.id, "Actor run started, polling for completion");

        let completed = self.wait_for_finish(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let items = self
            .collect_dataset(&completed.default_dataset_id, want)
            .await?;
        tracing::info!(count = items.len(), "Fetched actor items");
        Ok(items)
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActorError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp.json().await?)
    }
}
