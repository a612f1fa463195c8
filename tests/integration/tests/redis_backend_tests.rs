//! Redis backend tests
//!
//! These tests require a running Redis instance and `REDIS_URL`; without it
//! they return early.
//!
//! Run with: cargo test -p integration-tests --test redis_backend_tests

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use duochat_cache::{PubSubChannel, RedisBackend, Subscriber, SubscriberConfig};
use duochat_common::TypingConfig;
use duochat_core::{LivenessSink, LivenessSource, TypingSink, TypingSource};
use duochat_service::{LiveSession, SessionContext};
use integration_tests::{redis_test_config, ChatPair};
use tokio::time::timeout;

const DELIVERY: Duration = Duration::from_secs(5);

async fn connect() -> Option<RedisBackend> {
    connect_with(&TypingConfig::default()).await
}

async fn connect_with(typing: &TypingConfig) -> Option<RedisBackend> {
    let config = redis_test_config()?;
    Some(
        RedisBackend::connect(&config, typing)
            .await
            .expect("Failed to connect to Redis"),
    )
}

#[tokio::test]
async fn test_liveness_feed_follows_newest_signal() {
    let Some(backend) = connect().await else {
        return;
    };
    let pair = ChatPair::unique();

    let mut feed = backend.subscribe_liveness(pair.alice).await.unwrap();
    assert_eq!(feed.current(), None);

    let newer = Utc::now();
    backend.publish_liveness(pair.alice, newer).await.unwrap();
    assert!(timeout(DELIVERY, feed.changed()).await.unwrap());
    let signal = feed.current().unwrap().parse().unwrap();
    assert_eq!(signal.observed_at.timestamp_micros(), newer.timestamp_micros());

    // An older write never replaces a newer one
    let older = newer - chrono::Duration::seconds(30);
    backend.publish_liveness(pair.alice, older).await.unwrap();
    let stored = backend.store().last_seen(pair.alice).await.unwrap().unwrap();
    assert_eq!(
        stored.parse().unwrap().observed_at.timestamp_micros(),
        newer.timestamp_micros()
    );

    feed.unsubscribe();
    feed.unsubscribe();
    assert!(!feed.is_active());
}

#[tokio::test]
async fn test_typing_feed_excludes_viewer() {
    let Some(backend) = connect().await else {
        return;
    };
    let pair = ChatPair::unique();

    let mut feed = backend
        .subscribe_typing(pair.conversation, pair.bob)
        .await
        .unwrap();
    assert!(feed.current().is_empty());

    backend
        .publish_typing(pair.conversation, pair.alice, Utc::now())
        .await
        .unwrap();
    assert!(timeout(DELIVERY, feed.changed()).await.unwrap());
    let rows = feed.current();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, pair.alice);

    // The viewer's own row changes nothing they can see
    backend
        .publish_typing(pair.conversation, pair.bob, Utc::now())
        .await
        .unwrap();
    backend
        .retract_typing(pair.conversation, pair.alice)
        .await
        .unwrap();
    timeout(DELIVERY, async {
        while !feed.current().is_empty() {
            feed.changed().await;
        }
    })
    .await
    .unwrap();

    backend
        .retract_typing(pair.conversation, pair.bob)
        .await
        .unwrap();
    feed.unsubscribe();
}

#[tokio::test]
async fn test_sessions_over_redis() {
    let Some(backend) = connect().await else {
        return;
    };
    let backend = Arc::new(backend);
    let pair = ChatPair::unique();

    let alice = LiveSession::start(SessionContext::new(backend.clone(), Some(pair.alice)));
    let bob = LiveSession::start(SessionContext::new(backend.clone(), Some(pair.bob)));

    let mut watch = bob.watch_presence(pair.alice);
    timeout(DELIVERY, async {
        while !watch.is_online() {
            watch.changed().await;
        }
    })
    .await
    .unwrap();

    let mut alice_chat = alice.open_conversation(pair.conversation).unwrap();
    let mut bob_chat = bob.open_conversation(pair.conversation).unwrap();

    alice_chat.composer.input("hi bob").unwrap();
    timeout(DELIVERY, async {
        while !bob_chat.peer.is_peer_typing() {
            bob_chat.peer.changed().await;
        }
    })
    .await
    .unwrap();

    alice_chat.composer.submit().unwrap();
    timeout(DELIVERY, async {
        while bob_chat.peer.is_peer_typing() {
            bob_chat.peer.changed().await;
        }
    })
    .await
    .unwrap();

    alice_chat.close().await;
    bob_chat.close().await;
    watch.stop().await;
    alice.end().await;
    bob.end().await;
}

#[tokio::test]
async fn test_typing_keys_expire_after_stale_bound() {
    let typing = TypingConfig {
        refresh_interval: Duration::from_millis(500),
        stale_after: Duration::from_millis(1500),
        ..TypingConfig::default()
    };
    let Some(backend) = connect_with(&typing).await else {
        return;
    };
    let pair = ChatPair::unique();

    backend
        .publish_typing(pair.conversation, pair.alice, Utc::now())
        .await
        .unwrap();
    let rows = backend.store().conversation_typing(pair.conversation).await.unwrap();
    assert_eq!(rows.len(), 1);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    let rows = backend.store().conversation_typing(pair.conversation).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_new_subscription_triggers_resync() {
    let Some(config) = redis_test_config() else {
        return;
    };
    let subscriber = Subscriber::new(SubscriberConfig::for_url(config.url)).unwrap();
    let mut messages = subscriber.receiver();
    let channel = PubSubChannel::Typing(ChatPair::unique().conversation);

    subscriber.acquire(&channel).unwrap();

    // Followers re-fetch once Redis has confirmed the subscription
    let resync = timeout(DELIVERY, async {
        loop {
            let msg = messages.recv().await.unwrap();
            if msg.channel == channel && msg.resync {
                return msg;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(resync.notice, None);

    subscriber.release(&channel);
    subscriber.shutdown().unwrap();
}
