//! Liveness scenarios over the in-process backend
//!
//! Two sessions share one backend; tokio time is paused so every timer
//! (heartbeat, quiet period, staleness) is driven deterministically.
//!
//! Run with: cargo test -p integration-tests --test liveness_tests

use std::sync::Arc;

use duochat_core::{LivenessError, LivenessSink, LivenessSource, TypingSink};
use duochat_service::{Liveness, LiveSession, SessionContext};
use integration_tests::{
    advance_to, malformed_liveness, malformed_typing, origin, settle, sleep_ms, ChatPair,
    TestHarness,
};
use tokio::time::Instant;

// ============================================================================
// Typing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_typing_debounce_seen_by_peer() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let alice = LiveSession::start(harness.session(pair.alice));
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut alice_chat = alice.open_conversation(pair.conversation).unwrap();
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();

    let started = Instant::now();
    alice_chat.composer.input("h").unwrap();
    advance_to(started, 1000).await;
    alice_chat.composer.input("he").unwrap();

    advance_to(started, 2999).await;
    assert!(bob_chat.peer.is_peer_typing());
    assert_eq!(bob_chat.peer_typing().typing_user, Some(pair.alice));
    // A user never sees their own announcement
    assert!(!alice_chat.peer.is_peer_typing());

    advance_to(started, 3001).await;
    assert!(!bob_chat.peer.is_peer_typing());
    assert!(harness.backend.typing_snapshot(pair.conversation).is_empty());

    alice_chat.close().await;
    bob_chat.close().await;
    alice.end().await;
    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_continuous_typing_does_not_flicker() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let alice = LiveSession::start(harness.session(pair.alice));
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut alice_chat = alice.open_conversation(pair.conversation).unwrap();
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();

    // Keystrokes every 500ms for 15s, sampled in between
    for i in 0..30 {
        alice_chat.composer.input("x".repeat(i + 1)).unwrap();
        sleep_ms(250).await;
        assert!(bob_chat.peer.is_peer_typing(), "gap after keystroke {i}");
        sleep_ms(250).await;
        assert!(bob_chat.peer.is_peer_typing(), "gap before keystroke {}", i + 1);
    }

    alice_chat.composer.submit().unwrap();
    settle().await;
    assert!(!bob_chat.peer.is_peer_typing());

    alice_chat.close().await;
    bob_chat.close().await;
    alice.end().await;
    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_crashed_peer_stops_typing_after_stale_bound() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let alice = LiveSession::start(harness.session(pair.alice));
    let bob = LiveSession::start(harness.session(pair.bob));
    let alice_chat = alice.open_conversation(pair.conversation).unwrap();
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();

    let started = Instant::now();
    alice_chat.composer.input("about to vanish").unwrap();
    advance_to(started, 100).await;

    // Dropping without teardown: no retraction ever reaches the backend
    drop(alice_chat);
    drop(alice);

    advance_to(started, 9_999).await;
    assert!(bob_chat.peer.is_peer_typing());

    advance_to(started, 10_000).await;
    assert!(!bob_chat.peer.is_peer_typing());
    assert_eq!(harness.backend.typing_snapshot(pair.conversation).len(), 1);

    bob_chat.close().await;
    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_announcements_read_as_continuous() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();
    settle().await;

    let started = Instant::now();
    harness
        .backend
        .publish_typing(pair.conversation, pair.alice, harness.now())
        .await
        .unwrap();
    for ms in (50..500).step_by(50) {
        advance_to(started, ms).await;
        assert!(bob_chat.peer.is_peer_typing(), "flicker at {ms}ms");
    }

    advance_to(started, 500).await;
    harness
        .backend
        .publish_typing(pair.conversation, pair.alice, harness.now())
        .await
        .unwrap();
    for ms in (550..10_500).step_by(50) {
        advance_to(started, ms).await;
        assert!(bob_chat.peer.is_peer_typing(), "flicker at {ms}ms");
    }
    advance_to(started, 10_500).await;
    assert!(!bob_chat.peer.is_peer_typing());

    bob_chat.close().await;
    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_peer_clock_ahead_cannot_pin_typing() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();
    settle().await;

    // Alice's clock runs an hour fast; she crashes without retracting
    let started = Instant::now();
    let skewed = harness.now() + chrono::Duration::hours(1);
    harness
        .backend
        .publish_typing(pair.conversation, pair.alice, skewed)
        .await
        .unwrap();
    settle().await;
    assert!(bob_chat.peer.is_peer_typing());

    advance_to(started, 9_999).await;
    assert!(bob_chat.peer.is_peer_typing());
    advance_to(started, 10_000).await;
    assert!(!bob_chat.peer.is_peer_typing());

    advance_to(started, 30 * 60 * 1000).await;
    assert!(!bob_chat.peer.is_peer_typing());

    bob_chat.close().await;
    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_typing_row_is_ignored() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();

    harness
        .backend
        .put_raw_typing(malformed_typing(pair.conversation, pair.alice));
    settle().await;
    assert!(!bob_chat.peer.is_peer_typing());

    bob_chat.close().await;
    bob.end().await;
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_keeps_peer_online_until_session_ends() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let started = Instant::now();

    let alice = LiveSession::start(harness.session(pair.alice));
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut watch = bob.watch_presence(pair.alice);

    advance_to(started, 1).await;
    assert!(watch.is_online());
    assert_eq!(watch.current().label, "Online");

    advance_to(started, 30_001).await;
    let alice_beats = |harness: &TestHarness| {
        harness
            .backend
            .last_seen(pair.alice)
            .and_then(|row| row.parse().ok())
            .map(|signal| signal.observed_at)
    };
    assert_eq!(
        alice_beats(&harness),
        Some(origin() + chrono::Duration::seconds(30))
    );

    // Beats at 0, 30, 60 and 90 seconds
    advance_to(started, 95_000).await;
    alice.end().await;
    assert_eq!(
        alice_beats(&harness),
        Some(origin() + chrono::Duration::seconds(90))
    );

    advance_to(started, 149_999).await;
    assert!(watch.is_online());

    advance_to(started, 150_000).await;
    let view = watch.current();
    assert!(!view.is_online);
    assert_eq!(view.liveness, Liveness::RecentlyActive);
    assert_eq!(view.label, "1m ago");

    // Nothing more was published after the session ended
    advance_to(started, 300_000).await;
    assert_eq!(
        alice_beats(&harness),
        Some(origin() + chrono::Duration::seconds(90))
    );

    watch.stop().await;
    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_malformed_peers_read_offline() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let bob = LiveSession::start(harness.session(pair.bob));

    let mut never_seen = bob.watch_presence(pair.alice);
    settle().await;
    let view = never_seen.current();
    assert!(!view.is_online);
    assert_eq!(view.liveness, Liveness::Offline);
    assert_eq!(view.label, "Offline");
    never_seen.stop().await;

    harness.backend.put_raw_liveness(malformed_liveness(pair.alice));
    let mut malformed = bob.watch_presence(pair.alice);
    settle().await;
    assert_eq!(malformed.current().label, "Offline");
    assert_eq!(malformed.last_seen(), None);
    malformed.stop().await;

    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_shorter_online_window_reaches_just_now() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let config = duochat_common::AppConfig::from_lookup(|name| match name {
        "PRESENCE_ONLINE_WINDOW_SECS" => Some("30".to_string()),
        "PRESENCE_HEARTBEAT_INTERVAL_SECS" => Some("10".to_string()),
        _ => None,
    })
    .unwrap();
    let ctx = SessionContext::builder(harness.backend.clone())
        .self_id(pair.bob)
        .clock(Arc::new(harness.clock))
        .app_config(&config)
        .build();

    let started = Instant::now();
    harness
        .backend
        .publish_liveness(pair.alice, harness.now())
        .await
        .unwrap();
    let bob = LiveSession::start(ctx);
    let mut watch = bob.watch_presence(pair.alice);

    advance_to(started, 29_999).await;
    assert_eq!(watch.current().label, "Online");

    advance_to(started, 45_000).await;
    assert_eq!(watch.current().label, "Just now");

    advance_to(started, 60_000).await;
    assert_eq!(watch.current().label, "1m ago");

    watch.stop().await;
    bob.end().await;
}

// ============================================================================
// Sessions and subscriptions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_anonymous_session_reads_but_never_writes() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    harness
        .backend
        .publish_liveness(pair.alice, harness.now())
        .await
        .unwrap();

    let anonymous = LiveSession::start(harness.anonymous());
    assert!(!anonymous.is_heartbeat_running());
    assert!(matches!(
        anonymous.open_conversation(pair.conversation),
        Err(LivenessError::Unauthenticated)
    ));

    let mut watch = anonymous.watch_presence(pair.alice);
    settle().await;
    assert!(watch.is_online());

    sleep_ms(120_000).await;
    assert_eq!(harness.backend.liveness_writes(), 1);

    watch.stop().await;
    anonymous.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_is_idempotent() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();

    let feed = harness
        .backend
        .subscribe_liveness(pair.alice)
        .await
        .unwrap();
    assert_eq!(harness.backend.watcher_count(), 1);

    feed.unsubscribe();
    feed.unsubscribe();
    assert!(!feed.is_active());
    assert_eq!(harness.backend.watcher_count(), 0);
    drop(feed);
    assert_eq!(harness.backend.watcher_count(), 0);

    // Same through the service handles
    let bob = LiveSession::start(harness.session(pair.bob));
    let mut watch = bob.watch_presence(pair.alice);
    let mut chat = bob.open_conversation(pair.conversation).unwrap();
    settle().await;
    assert_eq!(harness.backend.watcher_count(), 2);

    watch.stop().await;
    watch.stop().await;
    chat.close().await;
    chat.close().await;
    assert_eq!(harness.backend.watcher_count(), 0);

    bob.end().await;
}

#[tokio::test(start_paused = true)]
async fn test_backend_outage_does_not_stop_heartbeat() {
    let harness = TestHarness::start(origin());
    let pair = ChatPair::unique();
    let started = Instant::now();

    harness.backend.set_reachable(false);
    let alice = LiveSession::start(harness.session(pair.alice));
    advance_to(started, 1).await;
    assert!(alice.is_heartbeat_running());
    assert_eq!(harness.backend.liveness_writes(), 0);

    harness.backend.set_reachable(true);
    advance_to(started, 30_001).await;
    assert_eq!(harness.backend.liveness_writes(), 1);

    alice.end().await;
}
