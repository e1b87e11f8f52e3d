//! Typed errors for the extraction service.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Each variant maps
//! to a stable machine-readable kind so route handlers can translate
//! them without string matching.

use thiserror::Error;

/// Errors that can occur during poster extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Missing API key or unsupported/unregistered provider. Never
    /// retried.
    #[error("config error: {0}")]
    Config(String),

    /// The target post does not exist.
    #[error("post not found: {post_id}")]
    PostNotFound { post_id: String },

    /// The post has no downloaded local image to extract from.
    #[error("no local image for post {post_id}")]
    ImageUnavailable { post_id: String },

    /// The post already carries extraction output and `overwrite` was
    /// not set. Carries the existing payload so the caller does not
    /// need a second round trip.
    #[error("post {post_id} already has extracted events")]
    AlreadyExtracted {
        post_id: String,
        existing: serde_json::Value,
    },

    /// AI provider call failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider response was not parsable, even after one repair
    /// attempt.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtractError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::PostNotFound { .. } => "post_not_found",
            Self::ImageUnavailable { .. } => "image_unavailable",
            Self::AlreadyExtracted { .. } => "already_extracted",
            Self::Provider(_) => "provider",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
