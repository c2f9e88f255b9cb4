//! Like/unlike mutations applied optimistically to cached feed pages.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::application::pagination::{PageNumber, window_for};
use crate::application::repos::{MutationSource, SourceError};
use crate::cache::{
    CacheConfig, Mutation, MutationError, MutationOutcome, OptimisticMutation, QueryCache,
    QueryKey,
};
use crate::domain::entities::{Actor, FeedPage};

/// Adds the actor to a post's likes.
pub struct LikePost {
    source: Arc<dyn MutationSource>,
}

impl LikePost {
    pub fn new(source: Arc<dyn MutationSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Mutation for LikePost {
    type Input = String;
    type Data = FeedPage;

    fn name(&self) -> &'static str {
        "like"
    }

    fn patch(&self, page: &FeedPage, post_id: &String, actor: &Actor) -> FeedPage {
        page.map_post(post_id, |post| post.with_like(actor))
    }

    async fn send(&self, post_id: &String) -> Result<(), SourceError> {
        self.source.like(post_id).await
    }
}

/// Removes the actor's like from a post.
pub struct UnlikePost {
    source: Arc<dyn MutationSource>,
}

impl UnlikePost {
    pub fn new(source: Arc<dyn MutationSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Mutation for UnlikePost {
    type Input = String;
    type Data = FeedPage;

    fn name(&self) -> &'static str {
        "unlike"
    }

    fn patch(&self, page: &FeedPage, post_id: &String, actor: &Actor) -> FeedPage {
        page.map_post(post_id, |post| post.without_like(&actor.user_id))
    }

    async fn send(&self, post_id: &String) -> Result<(), SourceError> {
        self.source.unlike(post_id).await
    }
}

pub struct LikeService {
    like: OptimisticMutation<LikePost>,
    unlike: OptimisticMutation<UnlikePost>,
    items_per_page: NonZeroU32,
}

impl LikeService {
    pub fn new(
        cache: Arc<QueryCache<FeedPage>>,
        source: Arc<dyn MutationSource>,
        config: CacheConfig,
        items_per_page: NonZeroU32,
    ) -> Self {
        Self {
            like: OptimisticMutation::new(
                Arc::clone(&cache),
                LikePost::new(Arc::clone(&source)),
                config.clone(),
            ),
            unlike: OptimisticMutation::new(cache, UnlikePost::new(source), config),
            items_per_page,
        }
    }

    fn key_for(&self, page: PageNumber) -> QueryKey {
        QueryKey::feed(window_for(self.items_per_page, page))
    }

    /// Like `post_id` as shown on feed page `page`.
    #[instrument(skip(self, actor), fields(page = page.get()))]
    pub async fn like(
        &self,
        page: PageNumber,
        post_id: &str,
        actor: Option<&Actor>,
    ) -> Result<MutationOutcome, MutationError> {
        self.like
            .invoke(self.key_for(page), post_id.to_string(), actor)
            .await
    }

    /// Remove the actor's like from `post_id` as shown on feed page `page`.
    #[instrument(skip(self, actor), fields(page = page.get()))]
    pub async fn unlike(
        &self,
        page: PageNumber,
        post_id: &str,
        actor: Option<&Actor>,
    ) -> Result<MutationOutcome, MutationError> {
        self.unlike
            .invoke(self.key_for(page), post_id.to_string(), actor)
            .await
    }
}
