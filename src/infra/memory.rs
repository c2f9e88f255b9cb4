//! In-memory feed backend seeded from a TOML fixture.
//!
//! Stands in for the remote feed service when running the CLI locally.
//!
//! ```toml
//! [[posts]]
//! id = "welcome"
//! title = "Welcome"
//! liked_by = [{ user_id = "u2", user_name = "Grace" }]
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::application::pagination::PageWindow;
use crate::application::repos::{FeedSource, MutationSource, SourceError};
use crate::domain::entities::{Actor, FeedPage, Post};

use super::error::InfraError;

#[derive(Debug, Default, Deserialize)]
struct FeedFixture {
    #[serde(default)]
    posts: Vec<Post>,
}

/// Behavior knobs for the in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Delay applied to every remote call.
    pub latency: Duration,
    /// Make every like/unlike call fail with a network error.
    pub fail_mutations: bool,
}

pub struct InMemoryFeed {
    posts: RwLock<Vec<Post>>,
    options: MemoryOptions,
}

impl InMemoryFeed {
    pub fn new(posts: Vec<Post>, options: MemoryOptions) -> Result<Self, InfraError> {
        // Reuse the page invariant to reject duplicate ids up front.
        let total = posts.len() as u64;
        let page = FeedPage::new(posts, total)
            .map_err(|err| InfraError::configuration(err.to_string()))?;
        Ok(Self {
            posts: RwLock::new(page.posts),
            options,
        })
    }

    pub fn from_toml(source: &str, options: MemoryOptions) -> Result<Self, InfraError> {
        let fixture: FeedFixture =
            toml::from_str(source).map_err(|err| InfraError::configuration(err.to_string()))?;
        Self::new(fixture.posts, options)
    }

    pub async fn from_fixture(path: &Path, options: MemoryOptions) -> Result<Self, InfraError> {
        let source = tokio::fs::read_to_string(path).await?;
        let feed = Self::from_toml(&source, options).map_err(|err| match err {
            InfraError::Configuration { message } => InfraError::fixture(path, message),
            other => other,
        })?;
        info!(path = %path.display(), "loaded feed fixture");
        Ok(feed)
    }

    /// Mutation endpoint acting on behalf of `actor`; calls without one are rejected.
    pub fn session(self: &Arc<Self>, actor: Option<Actor>) -> InMemorySession {
        InMemorySession {
            feed: Arc::clone(self),
            actor,
        }
    }

    pub async fn post(&self, id: &str) -> Option<Post> {
        self.posts
            .read()
            .await
            .iter()
            .find(|post| post.id == id)
            .cloned()
    }

    async fn simulate_latency(&self) {
        if !self.options.latency.is_zero() {
            tokio::time::sleep(self.options.latency).await;
        }
    }

    async fn apply(
        &self,
        post_id: &str,
        update: impl FnOnce(&Post) -> Post,
    ) -> Result<(), SourceError> {
        self.simulate_latency().await;
        if self.options.fail_mutations {
            return Err(SourceError::network("mutation endpoint unavailable"));
        }

        let mut posts = self.posts.write().await;
        let post = posts
            .iter_mut()
            .find(|post| post.id == post_id)
            .ok_or_else(|| SourceError::NotFound {
                post_id: post_id.to_string(),
            })?;
        let updated = update(&*post);
        *post = updated;
        Ok(())
    }
}

#[async_trait]
impl FeedSource for InMemoryFeed {
    async fn fetch(&self, window: PageWindow) -> Result<FeedPage, SourceError> {
        self.simulate_latency().await;
        let posts = self.posts.read().await;
        let skip = usize::try_from(window.skip).unwrap_or(usize::MAX);
        let take = usize::try_from(window.take).unwrap_or(usize::MAX);
        let page: Vec<Post> = posts.iter().skip(skip).take(take).cloned().collect();
        debug!(skip = window.skip, take = window.take, returned = page.len(), "served feed window");
        Ok(FeedPage {
            posts: page,
            post_count: posts.len() as u64,
        })
    }
}

/// Like/unlike calls attributed to one actor.
pub struct InMemorySession {
    feed: Arc<InMemoryFeed>,
    actor: Option<Actor>,
}

impl InMemorySession {
    fn actor(&self) -> Result<&Actor, SourceError> {
        self.actor.as_ref().ok_or(SourceError::Unauthorized)
    }
}

#[async_trait]
impl MutationSource for InMemorySession {
    async fn like(&self, post_id: &str) -> Result<(), SourceError> {
        let actor = self.actor()?;
        self.feed
            .apply(post_id, |post| post.with_like(actor))
            .await
    }

    async fn unlike(&self, post_id: &str) -> Result<(), SourceError> {
        let actor = self.actor()?;
        self.feed
            .apply(post_id, |post| post.without_like(&actor.user_id))
            .await
    }
}
