//! Batched social post ingestion through a remote scraping actor.
//!
//! The runner fetches recent posts per account through two
//! interchangeable transports:
//!
//! - [`transport::SubprocessTransport`] — drives the actor through an
//!   external CLI, streaming JSON over stdin/stdout.
//! - [`transport::RestTransport`] — submit + poll + paginate over HTTP.
//!
//! The subprocess path is preferred; the first infrastructure failure
//! there permanently downgrades the runner to REST. Run-outcome failures
//! are narrowed down by recursively bisecting the failed batch, so one
//! broken account never poisons its siblings.
//!
//! # Example
//!
//! ```rust,ignore
//! use ingestion::{Account, BatchActorRunner};
//!
//! let runner = BatchActorRunner::new(subprocess, rest);
//! let report = runner.fetch_posts(&accounts, 20).await;
//! for (handle, result) in &report.accounts {
//!     match result {
//!         Ok(posts) => println!("{handle}: {} new posts", posts.len()),
//!         Err(e) => eprintln!("{handle}: {e}"),
//!     }
//! }
//! ```

pub mod error;
pub mod items;
pub mod runner;
pub mod testing;
pub mod transport;
pub mod types;

pub use error::{IngestError, Result, TransportError};
pub use items::{ActorItem, FlatPost, NestedProfile};
pub use runner::{scan_known_streak, BatchActorRunner, RunnerConfig};
pub use transport::{
    ActorTransport, RestTransport, SubprocessConfig, SubprocessTransport, TransportKind,
};
pub use types::{Account, FetchReport, RawPost, SingleFetch};
