// SPDX-License-Identifier: MIT

use fright_tracker::db::collections::TIMELINE;
use fright_tracker::db::{encode, fetch, DocumentStore, MemoryStore};
use fright_tracker::error::AppError;
use fright_tracker::models::TimelinePost;

mod common;
use common::{sign_in, test_state};

/// Seed a post with an explicit creation time.
async fn seed_post(store: &MemoryStore, id: &str, author: &str, created_at: &str) {
    let post = TimelinePost {
        id: id.to_string(),
        user_id: author.to_string(),
        user_email: format!("{author}@example.com"),
        content: format!("post {id}"),
        created_at: created_at.to_string(),
        likes: Vec::new(),
        comments: Vec::new(),
        movie_id: None,
        movie_title: None,
    };
    store
        .set(TIMELINE, id, encode(&post).unwrap())
        .await
        .unwrap();
}

/// Seed `count` posts with strictly increasing timestamps.
async fn seed_posts(store: &MemoryStore, count: usize) {
    for i in 0..count {
        let ts = format!("2024-01-01T10:{:02}:{:02}Z", i / 60, i % 60);
        seed_post(store, &format!("p{i:03}"), "author", &ts).await;
    }
}

#[tokio::test]
async fn test_initial_load_is_ordered_newest_first() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_posts(&store, 5).await;

    state.timeline.load_posts(true).await;

    let posts = state.timeline.current().visible_posts();
    assert_eq!(posts.len(), 5);
    for pair in posts.windows(2) {
        assert!(pair[0].created_at > pair[1].created_at);
    }
}

#[tokio::test]
async fn test_has_more_is_the_full_page_heuristic() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_posts(&store, 15).await;

    state.timeline.load_posts(true).await;
    let feed = state.timeline.current();
    assert_eq!(feed.posts.len(), 10);
    assert!(feed.has_more);

    state.timeline.load_more().await;
    let feed = state.timeline.current();
    assert_eq!(feed.posts.len(), 15);
    assert!(!feed.has_more);

    // Loading past the end is a no-op once has_more is false.
    state.timeline.load_more().await;
    assert_eq!(state.timeline.current().posts.len(), 15);
}

#[tokio::test]
async fn test_load_more_deduplicates_when_a_post_lands_between_pages() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_posts(&store, 12).await;

    state.timeline.load_posts(true).await;
    assert_eq!(state.timeline.current().posts.len(), 10);

    // A new post lands on top between the two loads; the grown-limit query
    // re-reads the top page shifted by one.
    seed_post(&store, "fresh", "other", "2024-01-01T11:00:00Z").await;

    state.timeline.load_more().await;

    let posts = state.timeline.current().visible_posts();
    let mut ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total, "duplicate posts after load_more");
}

#[tokio::test]
async fn test_add_post_prepends_locally_and_stores_server_time() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;

    let post = state
        .timeline
        .add_post("it follows", Some((1091, "The Thing")))
        .await
        .expect("add_post");

    let feed = state.timeline.current();
    assert_eq!(feed.posts[0].value().id, post.id);
    assert_eq!(feed.posts[0].value().content, "it follows");

    let stored = fetch::<TimelinePost>(&store, TIMELINE, &post.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, "alice");
    assert_eq!(stored.movie_id, Some(1091));
    // The stored time is server-assigned; the local copy used the client
    // clock and is not reconciled.
    assert!(!stored.created_at.is_empty());
}

#[tokio::test]
async fn test_add_comment_mirrors_into_local_state() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_post(&store, "p1", "bob", "2024-01-01T10:00:00Z").await;
    state.timeline.load_posts(true).await;

    let comment = state
        .timeline
        .add_comment("p1", "what a jump scare")
        .await
        .expect("add_comment");

    let local = state.timeline.current().visible_posts();
    assert_eq!(local[0].comments.len(), 1);
    assert_eq!(local[0].comments[0].id, comment.id);

    let stored = fetch::<TimelinePost>(&store, TIMELINE, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.comments.len(), 1);
    assert_eq!(stored.comments[0].content, "what a jump scare");
}

#[tokio::test]
async fn test_comment_remote_append_is_idempotent_under_retry() {
    use fright_tracker::db::{to_value, FieldOp};

    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_post(&store, "p1", "bob", "2024-01-01T10:00:00Z").await;
    state.timeline.load_posts(true).await;

    let comment = state
        .timeline
        .add_comment("p1", "again")
        .await
        .expect("add_comment");

    // Replaying the same union-insert must not duplicate the comment.
    store
        .update(
            TIMELINE,
            "p1",
            vec![(
                "comments".to_string(),
                FieldOp::ArrayUnion(to_value(&comment).unwrap()),
            )],
        )
        .await
        .unwrap();

    let stored = fetch::<TimelinePost>(&store, TIMELINE, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.comments.len(), 1);
}

#[tokio::test]
async fn test_double_toggle_restores_like_membership() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_post(&store, "p1", "bob", "2024-01-01T10:00:00Z").await;
    state.timeline.load_posts(true).await;

    state.timeline.toggle_like("p1").await.expect("like");
    let stored = fetch::<TimelinePost>(&store, TIMELINE, "p1")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.liked_by("alice"));

    state.timeline.toggle_like("p1").await.expect("unlike");
    let stored = fetch::<TimelinePost>(&store, TIMELINE, "p1")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.liked_by("alice"));
    assert!(!state.timeline.current().visible_posts()[0].liked_by("alice"));
}

#[tokio::test]
async fn test_failed_like_rolls_back_local_state() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_post(&store, "p1", "bob", "2024-01-01T10:00:00Z").await;
    state.timeline.load_posts(true).await;

    store.fail_writes(true);
    let err = state
        .timeline
        .toggle_like("p1")
        .await
        .expect_err("remote write should fail");
    assert!(matches!(err, AppError::RemoteWrite(_)));
    store.fail_writes(false);

    // The optimistic flip was rolled back, locally and remotely.
    assert!(!state.timeline.current().visible_posts()[0].liked_by("alice"));
    let stored = fetch::<TimelinePost>(&store, TIMELINE, "p1")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.liked_by("alice"));
}

#[tokio::test]
async fn test_toggle_like_on_unknown_post_is_a_silent_noop() {
    let (state, _store) = test_state();
    sign_in(&state, "alice").await;
    state.timeline.load_posts(true).await;

    state
        .timeline
        .toggle_like("ghost")
        .await
        .expect("unknown post is a no-op");
}

#[tokio::test]
async fn test_author_filtered_feed() {
    let (state, store) = test_state();
    sign_in(&state, "alice").await;
    seed_post(&store, "p1", "bob", "2024-01-01T10:00:00Z").await;
    seed_post(&store, "p2", "carol", "2024-01-01T10:01:00Z").await;
    seed_post(&store, "p3", "bob", "2024-01-01T10:02:00Z").await;

    let bob_feed = state.author_timeline("bob");
    bob_feed.load_posts(true).await;

    let posts = bob_feed.current().visible_posts();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|p| p.user_id == "bob"));
}

#[tokio::test]
async fn test_unauthenticated_post_is_rejected() {
    let (state, _store) = test_state();

    let err = state
        .timeline
        .add_post("boo", None)
        .await
        .expect_err("must require identity");
    assert!(matches!(err, AppError::Unauthenticated));
}
