//! Batched actor execution with fallback and failure bisection.
//!
//! `BatchActorRunner` fetches recent posts for many accounts per actor
//! invocation. It prefers the subprocess transport, permanently falls
//! back to REST the first time the subprocess path fails for an
//! infrastructure reason, and isolates broken accounts by recursively
//! splitting failed batches in half.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actor_client::{ActorClient, ActorInput};
use chrono::Utc;
use serde_json::Value;

use crate::error::{IngestError, TransportError};
use crate::items::{classify, resolve_account, ActorItem, FlatPost};
use crate::transport::{ActorTransport, TransportKind};
use crate::types::{Account, AccountResult, FetchReport, RawPost, SingleFetch};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Accounts per actor invocation. Batching amortizes the
    /// per-invocation startup cost of the remote actor.
    pub batch_size: usize,

    /// Consecutive already-known post ids after which an account's feed
    /// scan stops. Non-consecutive known ids are skipped without
    /// counting toward this streak.
    pub known_streak_threshold: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            known_streak_threshold: 3,
        }
    }
}

pub struct BatchActorRunner {
    subprocess: Arc<dyn ActorTransport>,
    rest: Arc<dyn ActorTransport>,
    config: RunnerConfig,

    /// Write-once downgrade flag, owned by this instance. Once the
    /// subprocess path fails for an infrastructure reason, every later
    /// request in this runner's lifetime goes straight to REST.
    subprocess_down: AtomicBool,
}

impl BatchActorRunner {
    pub fn new(subprocess: Arc<dyn ActorTransport>, rest: Arc<dyn ActorTransport>) -> Self {
        Self {
            subprocess,
            rest,
            config: RunnerConfig::default(),
            subprocess_down: AtomicBool::new(false),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether the permanent REST downgrade has happened.
    pub fn subprocess_downgraded(&self) -> bool {
        self.subprocess_down.load(Ordering::Relaxed)
    }

    /// Fetch recent posts for each account, at most `limit_per_account`
    /// each, newest-first. Each account gets its own entry in the
    /// report: posts on success, its own error on failure.
    pub async fn fetch_posts(
        &self,
        accounts: &[Account],
        limit_per_account: usize,
    ) -> FetchReport {
        tracing::info!(
            accounts = accounts.len(),
            limit_per_account,
            "Fetching posts in batches"
        );

        let mut report = FetchReport::default();
        for batch in accounts.chunks(self.config.batch_size) {
            self.run_batch(batch, limit_per_account, &mut report.accounts)
                .await;
        }

        tracing::info!(
            ok = report.ok_count(),
            failed = report.err_count(),
            posts = report.total_posts(),
            "Batched fetch finished"
        );
        report
    }

    /// Diagnostic single-account fetch, reporting which transport
    /// actually served the request.
    pub async fn fetch_single(
        &self,
        account: &Account,
        limit: usize,
    ) -> Result<SingleFetch, IngestError> {
        let input = ActorInput::for_handles([account.handle.as_str()], limit as u32);
        let (items, served_by) = self.execute(&input, limit).await?;
        let mut grouped = self.collect_posts(&items, std::slice::from_ref(account), limit);
        let posts = grouped.remove(&account.handle).unwrap_or_default();
        Ok(SingleFetch { posts, served_by })
    }

    /// Import an already-finished run: fetch its original input and
    /// dataset directly, without issuing a new invocation.
    pub async fn import_run(
        &self,
        client: &ActorClient,
        run_id: &str,
        accounts: &[Account],
        limit_per_account: usize,
    ) -> Result<FetchReport, IngestError> {
        let run = client.get_run(run_id).await?;
        if !run.status.is_terminal() {
            return Err(TransportError::Outcome {
                detail: format!("run {run_id} has not finished yet ({:?})", run.status),
            }
            .into());
        }

        let input = match &run.default_key_value_store_id {
            Some(store_id) => client.run_input(store_id).await?,
            None => ActorInput::default(),
        };

        let want = if input.results_limit > 0 {
            input.results_limit as usize
        } else {
            (limit_per_account * accounts.len()).max(limit_per_account)
        };
        let items = client.collect_dataset(&run.default_dataset_id, want).await?;

        // Restrict to the accounts the run was actually asked for, when
        // the stored input names any.
        let targets: Vec<Account> =
            if input.usernames.is_empty() && input.direct_urls.is_empty() {
                accounts.to_vec()
            } else {
                accounts
                    .iter()
                    .filter(|a| {
                        input
                            .usernames
                            .iter()
                            .any(|u| u.eq_ignore_ascii_case(&a.handle))
                            || input.direct_urls.iter().any(|u| {
                                u.trim_end_matches('/').ends_with(&format!("/{}", a.handle))
                            })
                    })
                    .cloned()
                    .collect()
            };

        tracing::info!(
            run_id,
            items = items.len(),
            targets = targets.len(),
            "Importing finished run snapshot"
        );

        let mut report = FetchReport::default();
        for (handle, posts) in self.collect_posts(&items, &targets, limit_per_account) {
            report.accounts.insert(handle, Ok(posts));
        }
        Ok(report)
    }

    fn run_batch<'a>(
        &'a self,
        batch: &'a [Account],
        limit: usize,
        out: &'a mut BTreeMap<String, AccountResult>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let request_limit = (limit * batch.len()).max(limit);
            let input = ActorInput::for_handles(
                batch.iter().map(|a| a.handle.as_str()),
                request_limit as u32,
            );

            match self.execute(&input, request_limit).await {
                Ok((items, _served_by)) => {
                    for (handle, posts) in self.collect_posts(&items, batch, limit) {
                        out.insert(handle, Ok(posts));
                    }
                }
                Err(err) if batch.len() > 1 && err.is_bisectable() => {
                    tracing::warn!(
                        batch = batch.len(),
                        error = %err,
                        "Batch failed, bisecting"
                    );
                    let (left, right) = batch.split_at(batch.len() / 2);
                    self.run_batch(left, limit, out).await;
                    self.run_batch(right, limit, out).await;
                }
                Err(err) => {
                    for account in batch {
                        tracing::warn!(handle = %account.handle, error = %err, "Account fetch failed");
                        out.insert(account.handle.clone(), Err(err.clone().into()));
                    }
                }
            }
        })
    }

    /// Execute one invocation through the preferred transport.
    ///
    /// An infrastructure failure on the subprocess path flips the
    /// downgrade flag and transparently retries the same input via REST;
    /// the caller only sees an error if REST fails too.
    async fn execute(
        &self,
        input: &ActorInput,
        max_items: usize,
    ) -> Result<(Vec<Value>, TransportKind), TransportError> {
        if !self.subprocess_down.load(Ordering::Relaxed) {
            match self.subprocess.run(input, max_items).await {
                Ok(items) => return Ok((items, self.subprocess.kind())),
                Err(err) if err.is_infra() => {
                    self.subprocess_down.store(true, Ordering::Relaxed);
                    tracing::warn!(
                        error = %err,
                        "Subprocess transport broken, permanently falling back to REST"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let items = self.rest.run(input, max_items).await?;
        Ok((items, self.rest.kind()))
    }

    /// Normalize raw items into per-account posts: classify shapes,
    /// resolve owners, short-circuit on known-id streaks, then sort
    /// newest-first and truncate.
    fn collect_posts(
        &self,
        items: &[Value],
        batch: &[Account],
        limit: usize,
    ) -> BTreeMap<String, Vec<RawPost>> {
        let scraped_at = Utc::now();
        let mut grouped: BTreeMap<&str, Vec<FlatPost>> = batch
            .iter()
            .map(|a| (a.handle.as_str(), Vec::new()))
            .collect();

        for item in items {
            match classify(item) {
                ActorItem::Nested(profile) => {
                    match resolve_account(
                        batch,
                        profile.username.as_deref(),
                        profile.input_url.as_deref(),
                    ) {
                        Some(account) => {
                            if let Some(posts) = grouped.get_mut(account.handle.as_str()) {
                                posts.extend(profile.latest_posts);
                            }
                        }
                        None => tracing::debug!("Dropping nested item with unresolvable owner"),
                    }
                }
                ActorItem::Flat(post) => {
                    match resolve_account(
                        batch,
                        post.owner_username.as_deref(),
                        post.input_url.as_deref(),
                    ) {
                        Some(account) => {
                            if let Some(posts) = grouped.get_mut(account.handle.as_str()) {
                                posts.push(post);
                            }
                        }
                        None => tracing::debug!("Dropping flat item with unresolvable owner"),
                    }
                }
                ActorItem::Unrecognized => {
                    tracing::debug!("Dropping unrecognized dataset item");
                }
            }
        }

        let mut result = BTreeMap::new();
        for account in batch {
            let flats = grouped.remove(account.handle.as_str()).unwrap_or_default();
            let fresh = scan_known_streak(
                flats,
                |f| f.post_id(),
                &account.known_post_ids,
                self.config.known_streak_threshold,
            );

            let mut posts: Vec<RawPost> = fresh
                .into_iter()
                .filter_map(|f| f.into_raw_post(&account.handle, scraped_at))
                .collect();
            posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            posts.truncate(limit);

            result.insert(account.handle.clone(), posts);
        }
        result
    }
}

/// Scan items newest-first, dropping already-known ids and stopping
/// entirely once `threshold` consecutive known ids are seen. Known ids
/// that are not consecutive reset the streak and do not count toward it.
/// Items without an id are skipped.
pub fn scan_known_streak<T, F>(
    items: Vec<T>,
    id_of: F,
    known: &HashSet<String>,
    threshold: usize,
) -> Vec<T>
where
    F: Fn(&T) -> Option<&str>,
{
    let mut kept = Vec::new();
    let mut streak = 0;
    for item in items {
        let Some(id) = id_of(&item) else { continue };
        if known.contains(id) {
            streak += 1;
            if streak >= threshold {
                break;
            }
            continue;
        }
        streak = 0;
        kept.push(item);
    }
    kept
}
