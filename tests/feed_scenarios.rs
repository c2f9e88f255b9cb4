mod support;

use std::time::Duration;

use likefeed::application::feed::FeedError;
use likefeed::application::pagination::PageNumber;
use likefeed::application::repos::SourceError;
use likefeed::cache::{CacheConfig, EntryStatus, MutationError, MutationState};
use likefeed::domain::entities::FeedPage;

use support::{Harness, ScriptedRemote, abc, actor, poll_once, post};

fn likers(page: &FeedPage, id: &str) -> Vec<String> {
    page.post(id)
        .map(|post| post.liked_by.user_ids().map(str::to_string).collect())
        .unwrap_or_default()
}

fn ids(page: &FeedPage) -> Vec<&str> {
    page.posts.iter().map(|post| post.id.as_str()).collect()
}

#[tokio::test]
async fn like_success_keeps_the_patched_page() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());
    let view = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");
    assert_eq!(ids(&view.page), vec!["A", "B", "C"]);

    let outcome = harness
        .likes
        .like(PageNumber::FIRST, "B", Some(&actor("u1")))
        .await
        .expect("actor present");
    assert_eq!(outcome.state(), MutationState::Committed);
    assert_eq!(harness.remote.calls(), vec!["like:B"]);

    let key = harness.feed_service.key_for(PageNumber::FIRST);
    let entry = harness.cache.get(&key).expect("entry cached");
    assert_eq!(ids(entry.data()), vec!["A", "B", "C"]);
    assert_eq!(likers(entry.data(), "B"), vec!["u1"]);
    assert_eq!(entry.data().posts[0], view.page.posts[0]);
    assert_eq!(entry.data().posts[2], view.page.posts[2]);

    // Committed without reconciliation: the next read is served from cache.
    let again = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("cached read");
    assert_eq!(likers(&again.page, "B"), vec!["u1"]);
    assert_eq!(harness.feed.fetches(), 1);
}

#[tokio::test]
async fn like_failure_restores_the_exact_entry() {
    let harness = Harness::new(
        abc(&[]),
        ScriptedRemote::answering([Err(SourceError::network("connection reset"))]),
        CacheConfig::default(),
    );
    harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");
    let key = harness.feed_service.key_for(PageNumber::FIRST);
    let before = harness.cache.get(&key).expect("entry cached");

    let outcome = harness
        .likes
        .like(PageNumber::FIRST, "B", Some(&actor("u1")))
        .await
        .expect("actor present");
    assert_eq!(outcome.state(), MutationState::RolledBack);

    let after = harness.cache.get(&key).expect("entry still cached");
    assert_eq!(after.data(), before.data());
    assert_eq!(after.status, before.status);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(likers(after.data(), "B").is_empty());
}

#[tokio::test]
async fn unlike_removes_only_the_actor() {
    let harness = Harness::new(
        abc(&["u1", "u2"]),
        ScriptedRemote::answering([]),
        CacheConfig::default(),
    );
    harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");

    let outcome = harness
        .likes
        .unlike(PageNumber::FIRST, "B", Some(&actor("u1")))
        .await
        .expect("actor present");
    assert!(outcome.is_committed());
    assert_eq!(harness.remote.calls(), vec!["unlike:B"]);

    let view = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("cached read");
    assert_eq!(likers(&view.page, "B"), vec!["u2"]);
    // Commit takes no cache action; the entry is still the patched one.
    assert_eq!(view.status, EntryStatus::Pending);
}

#[tokio::test]
async fn unknown_post_leaves_page_unchanged_but_still_calls_remote() {
    let harness = Harness::new(
        abc(&[]),
        ScriptedRemote::answering([Err(SourceError::NotFound {
            post_id: "Z".to_string(),
        })]),
        CacheConfig::default(),
    );
    let loaded = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");

    let key = harness.feed_service.key_for(PageNumber::FIRST);
    let outcome = harness
        .likes
        .like(PageNumber::FIRST, "Z", Some(&actor("u1")))
        .await
        .expect("actor present");

    assert_eq!(harness.remote.calls(), vec!["like:Z"]);
    assert_eq!(outcome.state(), MutationState::RolledBack);
    let entry = harness.cache.get(&key).expect("entry cached");
    assert_eq!(entry.data(), &loaded.page);
}

#[tokio::test]
async fn missing_actor_is_rejected_before_any_remote_call() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());
    harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");
    let key = harness.feed_service.key_for(PageNumber::FIRST);
    let before = harness.cache.get(&key).expect("entry cached");

    let result = harness.likes.like(PageNumber::FIRST, "B", None).await;

    assert!(matches!(
        result,
        Err(MutationError::AuthRequired { mutation: "like" })
    ));
    assert!(harness.remote.calls().is_empty());
    assert_eq!(harness.cache.get(&key).expect("entry cached").data(), before.data());
}

#[tokio::test]
async fn feed_fetch_error_is_reported() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());
    harness.feed.fail_next(SourceError::network("upstream timeout"));

    let result = harness.feed_service.page(PageNumber::FIRST).await;

    assert!(matches!(result, Err(FeedError::Fetch(SourceError::Network(_)))));
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn empty_feed_reports_its_message() {
    let empty = FeedPage::new(Vec::new(), 0).expect("valid page");
    let harness = Harness::new(empty, ScriptedRemote::answering([]), CacheConfig::default());

    let view = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");

    assert!(view.is_empty);
    assert!(view.empty_message().is_some());
    assert_eq!(view.pagination.total_pages, 1);
}

#[tokio::test]
async fn in_flight_refresh_cannot_overwrite_an_optimistic_like() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());
    harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");
    let key = harness.feed_service.key_for(PageNumber::FIRST);

    // The server changes while a refresh is held open.
    let release = harness.feed.hold_next();
    harness.feed.set_page(
        FeedPage::new(vec![post("A", &["u9"]), post("B", &[]), post("C", &[])], 3)
            .expect("valid page"),
    );
    let service = harness.feed_service.clone();
    let refresh = tokio::spawn(async move { service.refresh(PageNumber::FIRST).await });
    tokio::time::timeout(Duration::from_secs(1), async {
        while !harness.cache.is_fetching(&key) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("refresh registered");

    let outcome = harness
        .likes
        .like(PageNumber::FIRST, "B", Some(&actor("u1")))
        .await
        .expect("actor present");
    assert!(outcome.is_committed());
    drop(release);

    // The cancelled refresh falls back to the cache; its own view may race the patch.
    refresh
        .await
        .expect("refresh task joins")
        .expect("cancelled refresh serves the cached entry");

    let entry = harness.cache.get(&key).expect("entry cached");
    assert_eq!(likers(entry.data(), "B"), vec!["u1"]);
    assert!(likers(entry.data(), "A").is_empty());
    assert!(!harness.cache.is_fetching(&key));
}

#[tokio::test]
async fn read_registered_while_a_like_cancels_cannot_overwrite_it() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());
    harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");
    harness.feed.set_page(
        FeedPage::new(vec![post("A", &["u9"]), post("B", &[]), post("C", &[])], 3)
            .expect("valid page"),
    );

    let _first_gate = harness.feed.hold_next();
    let mut first = Box::pin(harness.feed_service.refresh(PageNumber::FIRST));
    assert!(poll_once(&mut first).await.is_none());

    // The like cancels the first refresh and waits for it to stop.
    let actor = actor("u1");
    let mut like = Box::pin(harness.likes.like(PageNumber::FIRST, "B", Some(&actor)));
    assert!(poll_once(&mut like).await.is_none());

    // Meanwhile another refresh starts.
    let _second_gate = harness.feed.hold_next();
    let mut second = Box::pin(harness.feed_service.refresh(PageNumber::FIRST));
    assert!(poll_once(&mut second).await.is_none());

    first.await.expect("cancelled refresh serves the cached page");
    assert!(poll_once(&mut like).await.is_none());
    second
        .await
        .expect("cancelled refresh serves the cached page");
    let outcome = like.await.expect("actor present");
    assert!(outcome.is_committed());

    let view = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("cached read");
    assert_eq!(view.status, EntryStatus::Pending);
    assert_eq!(likers(&view.page, "B"), vec!["u1"]);
    assert!(likers(&view.page, "A").is_empty());
}

#[tokio::test]
async fn concurrent_first_loads_share_one_fetch() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());
    let release = harness.feed.hold_next();

    let mut first = Box::pin(harness.feed_service.page(PageNumber::FIRST));
    assert!(poll_once(&mut first).await.is_none());
    let mut second = Box::pin(harness.feed_service.page(PageNumber::FIRST));
    assert!(poll_once(&mut second).await.is_none());

    drop(release);
    let first = first.await.expect("first reader loads the page");
    let second = second.await.expect("second reader shares the load");

    assert_eq!(ids(&first.page), vec!["A", "B", "C"]);
    assert_eq!(first.page, second.page);
    assert_eq!(harness.feed.fetches(), 1);
}

#[tokio::test]
async fn reconcile_on_success_refetches_on_next_read() {
    let harness = Harness::new(
        abc(&[]),
        ScriptedRemote::answering([]),
        CacheConfig {
            reconcile_on_success: true,
        },
    );
    harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("initial load");
    harness.feed.set_page(abc(&["u1"]));

    harness
        .likes
        .like(PageNumber::FIRST, "B", Some(&actor("u1")))
        .await
        .expect("actor present");
    let key = harness.feed_service.key_for(PageNumber::FIRST);
    assert_eq!(
        harness.cache.get(&key).expect("entry cached").status,
        EntryStatus::Stale
    );

    let view = harness
        .feed_service
        .page(PageNumber::FIRST)
        .await
        .expect("reconciled read");
    assert_eq!(harness.feed.fetches(), 2);
    assert_eq!(view.status, EntryStatus::Fresh);
    assert_eq!(likers(&view.page, "B"), vec!["u1"]);
}

#[tokio::test]
async fn like_on_an_uncached_page_still_sends() {
    let harness = Harness::new(abc(&[]), ScriptedRemote::answering([]), CacheConfig::default());

    let outcome = harness
        .likes
        .like(PageNumber::FIRST, "B", Some(&actor("u1")))
        .await
        .expect("actor present");

    assert!(outcome.is_committed());
    assert_eq!(harness.remote.calls(), vec!["like:B"]);
    assert!(harness.cache.is_empty());
}
