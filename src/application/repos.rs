//! Traits describing the remote collaborators behind the feed.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageWindow;
use crate::domain::entities::FeedPage;

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("post `{post_id}` not found")]
    NotFound { post_id: String },
    #[error("remote rejected an unauthenticated call")]
    Unauthorized,
}

impl SourceError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::Network(err.to_string())
    }
}

/// Read side: serves pages of the published feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, window: PageWindow) -> Result<FeedPage, SourceError>;
}

/// Write side: records likes on behalf of the authenticated caller.
#[async_trait]
pub trait MutationSource: Send + Sync {
    async fn like(&self, post_id: &str) -> Result<(), SourceError>;

    async fn unlike(&self, post_id: &str) -> Result<(), SourceError>;
}
