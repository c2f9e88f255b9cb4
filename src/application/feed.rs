use std::num::NonZeroU32;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::pagination::{PageNumber, PaginationSummary, window_for};
use crate::application::repos::{FeedSource, SourceError};
use crate::cache::{CacheEntry, CacheError, EntryStatus, QueryCache, QueryKey};
use crate::domain::entities::FeedPage;

pub const EMPTY_FEED_MESSAGE: &str = "There are no published posts to show yet.";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to load feed: {0}")]
    Fetch(#[from] SourceError),
    #[error("feed read was cancelled before any page was cached")]
    Cancelled,
}

/// A feed page ready for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct FeedView {
    pub page: FeedPage,
    #[serde(skip)]
    pub status: EntryStatus,
    pub pagination: PaginationSummary,
    pub is_empty: bool,
}

impl FeedView {
    fn new(entry: &CacheEntry<FeedPage>, items_per_page: NonZeroU32, current: PageNumber) -> Self {
        let page = entry.data().clone();
        Self {
            pagination: PaginationSummary::new(page.post_count, items_per_page, current),
            is_empty: page.is_empty(),
            status: entry.status,
            page,
        }
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        self.is_empty.then_some(EMPTY_FEED_MESSAGE)
    }
}

#[derive(Clone)]
pub struct FeedService {
    cache: Arc<QueryCache<FeedPage>>,
    source: Arc<dyn FeedSource>,
    items_per_page: NonZeroU32,
}

impl FeedService {
    pub fn new(
        cache: Arc<QueryCache<FeedPage>>,
        source: Arc<dyn FeedSource>,
        items_per_page: NonZeroU32,
    ) -> Self {
        Self {
            cache,
            source,
            items_per_page,
        }
    }

    pub fn items_per_page(&self) -> NonZeroU32 {
        self.items_per_page
    }

    pub fn key_for(&self, page: PageNumber) -> QueryKey {
        QueryKey::feed(window_for(self.items_per_page, page))
    }

    /// Load `page` from the cache, reading through to the source on a miss.
    #[instrument(skip(self), fields(page = page.get()))]
    pub async fn page(&self, page: PageNumber) -> Result<FeedView, FeedError> {
        let key = self.key_for(page);
        let window = window_for(self.items_per_page, page);
        let result = self
            .cache
            .ensure(&key, || self.source.fetch(window))
            .await;
        self.resolve(&key, page, result)
    }

    /// Refetch `page` from the source regardless of what is cached.
    #[instrument(skip(self), fields(page = page.get()))]
    pub async fn refresh(&self, page: PageNumber) -> Result<FeedView, FeedError> {
        let key = self.key_for(page);
        let window = window_for(self.items_per_page, page);
        let result = self.cache.fetch(&key, self.source.fetch(window)).await;
        self.resolve(&key, page, result)
    }

    fn resolve(
        &self,
        key: &QueryKey,
        page: PageNumber,
        result: Result<CacheEntry<FeedPage>, CacheError<SourceError>>,
    ) -> Result<FeedView, FeedError> {
        let entry = match result {
            Ok(entry) => entry,
            Err(CacheError::Source(err)) => return Err(FeedError::Fetch(err)),
            Err(CacheError::Cancelled(_)) => {
                // A mutation cancelled this read; whatever it left in the cache wins.
                debug!(query = %key, "read cancelled, serving cached entry");
                self.cache.get(key).ok_or(FeedError::Cancelled)?
            }
        };
        Ok(FeedView::new(&entry, self.items_per_page, page))
    }
}
