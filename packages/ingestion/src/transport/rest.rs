//! REST execution transport.
//!
//! Wraps the `actor-client` submit/poll/paginate flow. REST failures are
//! never infrastructure errors: a broken run or an elapsed poll deadline
//! is something bisection can narrow down, not a reason to change
//! transports.

use std::sync::Arc;

use actor_client::{ActorClient, ActorError, ActorInput};
use async_trait::async_trait;
use serde_json::Value;

use super::{ActorTransport, TransportKind};
use crate::error::TransportError;

pub struct RestTransport {
    client: Arc<ActorClient>,
}

impl RestTransport {
    pub fn new(client: Arc<ActorClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ActorClient {
        &self.client
    }
}

#[async_trait]
impl ActorTransport for RestTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    async fn run(
        &self,
        input: &ActorInput,
        max_items: usize,
    ) -> std::result::Result<Vec<Value>, TransportError> {
        self.client
            .run_to_completion(input, max_items)
            .await
            .map_err(|e| match e {
                ActorError::PollTimeout { waited, .. } => {
                    TransportError::Timeout { elapsed: waited }
                }
                other => TransportError::Outcome {
                    detail: other.to_string(),
                },
            })
    }
}
