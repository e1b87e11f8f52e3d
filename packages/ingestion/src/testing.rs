//! Testing utilities including a mock transport.
//!
//! Useful for testing runner behavior without spawning subprocesses or
//! making network calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use actor_client::ActorInput;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::{ActorTransport, TransportKind};

/// A mock transport with canned per-handle items, scripted failures,
/// and recorded invocations.
#[derive(Clone)]
pub struct MockTransport {
    kind: TransportKind,
    items: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    fail_handles: Arc<RwLock<HashMap<String, TransportError>>>,
    fail_next: Arc<RwLock<VecDeque<TransportError>>>,
    fail_always: Arc<RwLock<Option<TransportError>>>,
    calls: Arc<RwLock<Vec<ActorInput>>>,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            items: Arc::new(RwLock::new(HashMap::new())),
            fail_handles: Arc::new(RwLock::new(HashMap::new())),
            fail_next: Arc::new(RwLock::new(VecDeque::new())),
            fail_always: Arc::new(RwLock::new(None)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Canned items returned whenever an input targets `handle`.
    pub fn with_items(self, handle: impl Into<String>, items: Vec<Value>) -> Self {
        self.items.write().unwrap().insert(handle.into(), items);
        self
    }

    /// Fail any invocation whose input targets `handle`.
    pub fn with_failure_for(self, handle: impl Into<String>, err: TransportError) -> Self {
        self.fail_handles.write().unwrap().insert(handle.into(), err);
        self
    }

    /// Fail every invocation with this error.
    pub fn with_fail_always(self, err: TransportError) -> Self {
        *self.fail_always.write().unwrap() = Some(err);
        self
    }

    /// Fail only the next invocation with this error.
    pub fn push_failure(&self, err: TransportError) {
        self.fail_next.write().unwrap().push_back(err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Inputs of every recorded invocation, in order.
    pub fn calls(&self) -> Vec<ActorInput> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl ActorTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn run(
        &self,
        input: &ActorInput,
        max_items: usize,
    ) -> std::result::Result<Vec<Value>, TransportError> {
        self.calls.write().unwrap().push(input.clone());

        if let Some(err) = self.fail_always.read().unwrap().as_ref() {
            return Err(err.clone());
        }
        if let Some(err) = self.fail_next.write().unwrap().pop_front() {
            return Err(err);
        }
        {
            let fail_handles = self.fail_handles.read().unwrap();
            for username in &input.usernames {
                if let Some(err) = fail_handles.get(username) {
                    return Err(err.clone());
                }
            }
        }

        let canned = self.items.read().unwrap();
        let mut items = Vec::new();
        for username in &input.usernames {
            if let Some(posts) = canned.get(username) {
                items.extend(posts.iter().cloned());
            }
        }
        items.truncate(max_items);
        Ok(items)
    }
}

/// Build a flat dataset item the way the actor emits them.
pub fn flat_item(handle: &str, short_code: &str, timestamp: &str) -> Value {
    json!({
        "shortCode": short_code,
        "caption": format!("caption for {short_code}"),
        "displayUrl": format!("https://cdn.example.com/{short_code}.jpg"),
        "url": format!("https://www.instagram.com/p/{short_code}/"),
        "timestamp": timestamp,
        "ownerUsername": handle,
    })
}

/// Build a nested dataset item: one profile object carrying posts.
pub fn nested_item(handle: &str, posts: Vec<Value>) -> Value {
    json!({
        "username": handle,
        "inputUrl": format!("https://www.instagram.com/{handle}/"),
        "latestPosts": posts,
    })
}
