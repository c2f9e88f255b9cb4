//! Scripted feed and mutation backends shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use likefeed::application::feed::FeedService;
use likefeed::application::likes::LikeService;
use likefeed::application::pagination::PageWindow;
use likefeed::application::repos::{FeedSource, MutationSource, SourceError};
use likefeed::cache::{CacheConfig, QueryCache};
use likefeed::domain::entities::{Actor, FeedPage, LikeRecord, Post};
use tokio::sync::oneshot;

pub const PER_PAGE: u32 = 20;

pub fn per_page() -> NonZeroU32 {
    NonZeroU32::new(PER_PAGE).expect("non-zero page size")
}

pub fn post(id: &str, likes: &[&str]) -> Post {
    Post {
        id: id.to_string(),
        title: format!("Post {id}"),
        liked_by: likes
            .iter()
            .map(|user| LikeRecord {
                user_id: user.to_string(),
                user_name: format!("User {user}"),
            })
            .collect(),
    }
}

pub fn abc(likes_on_b: &[&str]) -> FeedPage {
    FeedPage::new(
        vec![post("A", &[]), post("B", likes_on_b), post("C", &[])],
        3,
    )
    .expect("valid page")
}

/// Poll `future` exactly once, returning its output if it finished.
pub async fn poll_once<F: Future + Unpin>(future: &mut F) -> Option<F::Output> {
    tokio::time::timeout(Duration::ZERO, future).await.ok()
}

pub fn actor(user_id: &str) -> Actor {
    Actor::new(user_id, format!("User {user_id}")).expect("valid actor")
}

/// Serves a fixed page; a fetch can be held open until the test releases it.
#[derive(Default)]
pub struct ScriptedFeed {
    page: Mutex<FeedPage>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    failure: Mutex<Option<SourceError>>,
    fetches: AtomicUsize,
}

impl ScriptedFeed {
    pub fn serving(page: FeedPage) -> Arc<Self> {
        Arc::new(Self {
            page: Mutex::new(page),
            ..Default::default()
        })
    }

    pub fn set_page(&self, page: FeedPage) {
        *self.page.lock().expect("page lock") = page;
    }

    pub fn fail_next(&self, error: SourceError) {
        *self.failure.lock().expect("failure lock") = Some(error);
    }

    /// Hold the next fetch until the returned sender fires or is dropped.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().expect("gate lock") = Some(rx);
        tx
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch(&self, _window: PageWindow) -> Result<FeedPage, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().expect("gate lock").take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = self.failure.lock().expect("failure lock").take() {
            return Err(error);
        }
        Ok(self.page.lock().expect("page lock").clone())
    }
}

/// Records every remote call and answers with scripted results (default: success).
#[derive(Default)]
pub struct ScriptedRemote {
    results: Mutex<VecDeque<Result<(), SourceError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn answering(results: impl IntoIterator<Item = Result<(), SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn answer(&self, call: String) -> Result<(), SourceError> {
        self.calls.lock().expect("calls lock").push(call);
        self.results
            .lock()
            .expect("results lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl MutationSource for ScriptedRemote {
    async fn like(&self, post_id: &str) -> Result<(), SourceError> {
        self.answer(format!("like:{post_id}"))
    }

    async fn unlike(&self, post_id: &str) -> Result<(), SourceError> {
        self.answer(format!("unlike:{post_id}"))
    }
}

pub struct Harness {
    pub cache: Arc<QueryCache<FeedPage>>,
    pub feed: Arc<ScriptedFeed>,
    pub remote: Arc<ScriptedRemote>,
    pub feed_service: FeedService,
    pub likes: LikeService,
}

impl Harness {
    pub fn new(page: FeedPage, remote: Arc<ScriptedRemote>, config: CacheConfig) -> Self {
        let cache = Arc::new(QueryCache::new());
        let feed = ScriptedFeed::serving(page);
        let feed_service = FeedService::new(Arc::clone(&cache), feed.clone(), per_page());
        let likes = LikeService::new(Arc::clone(&cache), remote.clone(), config, per_page());
        Self {
            cache,
            feed,
            remote,
            feed_service,
            likes,
        }
    }
}
