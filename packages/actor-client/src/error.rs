use std::time::Duration;

use thiserror::Error;

use crate::types::RunStatus;

/// Errors from the actor platform API.
#[derive(Debug, Error)]
pub enum ActorError {
    /// HTTP transport failure (connection, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the platform.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Run reached a terminal state other than SUCCEEDED.
    #[error("actor run ended as {status:?}")]
    RunFailed { status: RunStatus },

    /// Run did not reach a terminal state before the poll deadline.
    ///
    /// Distinct from `RunFailed` so callers can tell "the run broke"
    /// apart from "we stopped waiting".
    #[error("run {run_id} still not finished after {waited:?}")]
    PollTimeout { run_id: String, waited: Duration },

    /// Response body was not the expected JSON shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ActorError>;
