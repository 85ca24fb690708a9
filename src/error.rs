//! Failures the feed reports to its embedding. None of them are fatal.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The fetch collaborator failed; displayed runs are kept.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The push channel could not be opened or dropped; paging keeps working.
    #[error("subscription to {key} failed: {reason}")]
    Subscription { key: String, reason: String },
    /// A collaborator answered with something we could not decode.
    #[error("parse error: {0}")]
    Parse(String),
}

impl FeedError {
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        FeedError::Fetch(err.to_string())
    }
}
