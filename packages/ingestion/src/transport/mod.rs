//! Interchangeable execution transports for actor runs.
//!
//! Both transports take the same structured input and return the raw
//! dataset items; the runner decides which one to use and when to fall
//! back.

pub mod rest;
pub mod subprocess;

pub use rest::RestTransport;
pub use subprocess::{SubprocessConfig, SubprocessTransport};

use actor_client::ActorInput;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// Which execution path served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Subprocess,
    Rest,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subprocess => write!(f, "subprocess"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

/// One way of executing an actor run end-to-end.
#[async_trait]
pub trait ActorTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Execute a run and return its raw dataset items.
    async fn run(
        &self,
        input: &ActorInput,
        max_items: usize,
    ) -> std::result::Result<Vec<Value>, TransportError>;
}
