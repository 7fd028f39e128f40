//! The index page cache: TTL staleness, explicit clear, and the routes
//! it must never touch. Driven with a manual clock, so expiry is exact.

mod support;

use axum::http::StatusCode;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

use support::{
    MemoryStore, ManualClock, body_string, cached_router, get, get_with_session,
};

fn start_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp in range")
}

#[tokio::test]
async fn index_serves_stale_content_until_cleared() {
    let store = MemoryStore::new();
    let bob = store.add_user("bob");
    store.add_post(&bob, "the first post", None);

    let clock = ManualClock::new(start_time());
    let (app, cache) = cached_router(&store, clock.clone());

    // (1) Cold cache: the response is rendered and captured.
    let first = app.clone().oneshot(get("/")).await.expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_string(first).await;
    assert!(first_body.contains("the first post"));

    // (2) A write lands while the entry is live.
    store.add_post(&bob, "the second post", None);

    // (3) Within the TTL the cached page is replayed unchanged: the new
    // post is invisible.
    clock.advance(Duration::seconds(10));
    let cached = app.clone().oneshot(get("/")).await.expect("response");
    let cached_body = body_string(cached).await;
    assert_eq!(cached_body, first_body);
    assert!(!cached_body.contains("the second post"));

    // (4) An explicit clear drops the entry.
    cache.clear();

    // (5) The next read renders fresh and sees the write.
    let fresh = app.oneshot(get("/")).await.expect("response");
    let fresh_body = body_string(fresh).await;
    assert_ne!(fresh_body, first_body);
    assert!(fresh_body.contains("the second post"));
}

#[tokio::test]
async fn index_entries_expire_after_the_ttl() {
    let store = MemoryStore::new();
    let bob = store.add_user("bob");
    store.add_post(&bob, "before the window", None);

    let clock = ManualClock::new(start_time());
    let (app, _cache) = cached_router(&store, clock.clone());

    let first = app.clone().oneshot(get("/")).await.expect("response");
    let first_body = body_string(first).await;

    store.add_post(&bob, "after the window", None);

    // One second short of the deadline: still stale.
    clock.advance(Duration::seconds(19));
    let stale = app.clone().oneshot(get("/")).await.expect("response");
    assert!(!body_string(stale).await.contains("after the window"));

    // Past the deadline: the entry is gone and the write shows up.
    clock.advance(Duration::seconds(2));
    let fresh = app.oneshot(get("/")).await.expect("response");
    let fresh_body = body_string(fresh).await;
    assert_ne!(fresh_body, first_body);
    assert!(fresh_body.contains("after the window"));
}

#[tokio::test]
async fn logged_in_viewers_bypass_the_cache() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice");
    let bob = store.add_user("bob");
    store.add_post(&bob, "shared post", None);
    let token = store.add_session(&alice);

    let clock = ManualClock::new(start_time());
    let (app, _cache) = cached_router(&store, clock);

    // Prime the cache with the anonymous rendering.
    let anonymous = app.clone().oneshot(get("/")).await.expect("response");
    let anonymous_body = body_string(anonymous).await;
    assert!(anonymous_body.contains("Log in"));

    // A logged-in request must not be served the anonymous page, nor
    // overwrite it.
    let logged_in = app
        .clone()
        .oneshot(get_with_session("/", &token))
        .await
        .expect("response");
    let logged_in_body = body_string(logged_in).await;
    assert!(logged_in_body.contains("@alice"));

    let anonymous_again = app.oneshot(get("/")).await.expect("response");
    assert_eq!(body_string(anonymous_again).await, anonymous_body);
}

#[tokio::test]
async fn pages_are_cached_per_query() {
    let store = MemoryStore::new();
    let bob = store.add_user("bob");
    for i in 0..7 {
        store.add_post(&bob, &format!("numbered post {i}"), None);
    }

    let clock = ManualClock::new(start_time());
    let (app, cache) = cached_router(&store, clock);

    let page_one = app.clone().oneshot(get("/")).await.expect("response");
    let page_two = app
        .clone()
        .oneshot(get("/?page=2"))
        .await
        .expect("response");

    let one_body = body_string(page_one).await;
    let two_body = body_string(page_two).await;
    assert_ne!(one_body, two_body);
    assert!(one_body.contains("Page 1 of 2"));
    assert!(two_body.contains("Page 2 of 2"));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn group_profile_and_feed_routes_are_never_cached() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice");
    let bob = store.add_user("bob");
    let group = store.add_group("Trains", "trains");
    store.add_post(&bob, "older group post", Some(&group));
    let token = store.add_session(&alice);

    let clock = ManualClock::new(start_time());
    let (app, _cache) = cached_router(&store, clock.clone());

    let first = app
        .clone()
        .oneshot(get("/groups/trains"))
        .await
        .expect("response");
    assert!(!body_string(first).await.contains("newer group post"));

    store.add_post(&bob, "newer group post", Some(&group));

    // Same clock instant, same URL: a cached route would replay the old
    // body, this one must not.
    let second = app
        .clone()
        .oneshot(get("/groups/trains"))
        .await
        .expect("response");
    assert!(body_string(second).await.contains("newer group post"));

    let profile = app
        .clone()
        .oneshot(get("/profiles/bob"))
        .await
        .expect("response");
    assert!(body_string(profile).await.contains("newer group post"));

    app.clone()
        .oneshot(support::post_with_session("/profiles/bob/follow", &token))
        .await
        .expect("follow");
    store.add_post(&bob, "feed sees this at once", None);
    let feed = app
        .oneshot(get_with_session("/feed", &token))
        .await
        .expect("response");
    assert!(body_string(feed).await.contains("feed sees this at once"));
}

#[tokio::test]
async fn disabled_cache_reads_through_every_time() {
    let store = MemoryStore::new();
    let bob = store.add_user("bob");
    store.add_post(&bob, "first", None);

    // No cache layer at all.
    let app = support::router(&store);

    let first = app.clone().oneshot(get("/")).await.expect("response");
    assert!(body_string(first).await.contains("first"));

    store.add_post(&bob, "second", None);
    let second = app.oneshot(get("/")).await.expect("response");
    assert!(body_string(second).await.contains("second"));
}
