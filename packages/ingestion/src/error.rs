//! Typed errors for the ingestion pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can
//! distinguish infrastructure failures from run-outcome failures.

use std::time::Duration;

use thiserror::Error;

/// A failure while executing an actor run through a transport.
///
/// The classification drives retry behavior:
/// - `Infra` flips the runner's permanent REST downgrade and is retried
///   transparently on the other transport; it never triggers bisection.
/// - `Outcome` and `Timeout` are bisection-eligible and never flip the
///   transport flag.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport itself is broken: missing executable, unparsable
    /// output, or a missing-dependency signature on the subprocess path.
    #[error("transport infrastructure failure: {reason}")]
    Infra { reason: String },

    /// The actor run ended in a failed, aborted, or timed-out terminal
    /// status, or the platform rejected the request.
    #[error("actor run failed: {detail}")]
    Outcome { detail: String },

    /// The polling or process deadline elapsed before the run finished.
    #[error("actor run deadline elapsed after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

impl TransportError {
    pub fn is_infra(&self) -> bool {
        matches!(self, Self::Infra { .. })
    }

    /// Whether a failed batch carrying this error should be split in
    /// half and retried. Infra failures are handled by the transport
    /// downgrade instead.
    pub fn is_bisectable(&self) -> bool {
        !self.is_infra()
    }
}

/// Errors surfaced by the ingestion crate.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Direct actor API failure (retroactive run import path).
    #[error("actor API error: {0}")]
    Actor(#[from] actor_client::ActorError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_is_not_bisectable() {
        let err = TransportError::Infra {
            reason: "executable not found".into(),
        };
        assert!(err.is_infra());
        assert!(!err.is_bisectable());
    }

    #[test]
    fn timeout_is_distinct_and_bisectable() {
        let err = TransportError::Timeout {
            elapsed: Duration::from_secs(300),
        };
        assert!(!err.is_infra());
        assert!(err.is_bisectable());
    }
}
