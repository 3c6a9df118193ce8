use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedError>;

/// Anything that can go wrong between asking for a feed and holding normalized cards.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("feed fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unexpected feed shape: {0}")]
    Shape(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("refresh task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl FeedError {
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }
}
