//! Redis backend.
//!
//! Writes go to the [`LivenessStore`] and are followed by a change notice on
//! the matching Pub/Sub channel. Followers re-read the store on every notice
//! (and after the subscriber reconnects), so a missed or coalesced notice
//! only delays a snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duochat_common::{RedisConfig, TypingConfig};
use duochat_core::{
    ConversationId, Feed, LivenessError, LivenessResult, LivenessSink, LivenessSource,
    RawLiveness, RawTypingAnnouncement, Subscription, TypingSink, TypingSource, UserId,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, watch};

use crate::pool::{RedisPool, RedisResult};
use crate::presence::LivenessStore;
use crate::pubsub::{ChangeNotice, PubSubChannel, Publisher, Subscriber, SubscriberConfig};

/// Redis-backed liveness backend
#[derive(Debug, Clone)]
pub struct RedisBackend {
    store: LivenessStore,
    publisher: Publisher,
    subscriber: Arc<Subscriber>,
}

impl RedisBackend {
    /// Connect to Redis and start the shared subscriber. Typing keys expire
    /// after `typing.stale_after`, the bound receivers already apply.
    pub async fn connect(config: &RedisConfig, typing: &TypingConfig) -> LivenessResult<Self> {
        let pool = RedisPool::from_config(config).map_err(LivenessError::transport)?;
        pool.ping().await.map_err(LivenessError::transport)?;

        let subscriber =
            Subscriber::new(SubscriberConfig::for_url(pool.url())).map_err(LivenessError::transport)?;

        tracing::info!("Redis liveness backend ready");

        Ok(Self::from_parts(
            LivenessStore::new(pool.clone()).with_typing_ttl(typing.stale_after),
            Publisher::new(pool),
            Arc::new(subscriber),
        ))
    }

    /// Assemble from already-built parts
    #[must_use]
    pub fn from_parts(store: LivenessStore, publisher: Publisher, subscriber: Arc<Subscriber>) -> Self {
        Self {
            store,
            publisher,
            subscriber,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &LivenessStore {
        &self.store
    }

    async fn notify(&self, notice: ChangeNotice) -> LivenessResult<()> {
        self.publisher
            .announce(&notice)
            .await
            .map(|_| ())
            .map_err(LivenessError::transport)
    }

    /// Feed a snapshot that is re-fetched whenever `channel` carries a notice
    async fn follow<T, F, Fut>(&self, channel: PubSubChannel, fetch: F) -> LivenessResult<Feed<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RedisResult<T>> + Send + 'static,
    {
        // Receiver before acquire: the listener sends a resync once Redis
        // confirms the subscription, covering writes after the first fetch
        let mut notices = self.subscriber.receiver();
        self.subscriber
            .acquire(&channel)
            .map_err(LivenessError::transport)?;

        let initial = match fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.subscriber.release(&channel);
                return Err(LivenessError::transport(e));
            }
        };

        let (sender, receiver) = watch::channel(initial);
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let subscriber = self.subscriber.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    notice = notices.recv() => match notice {
                        Ok(msg) if msg.channel == channel => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(channel = %channel, skipped, "Notice receiver lagged, re-fetching");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }

                match fetch().await {
                    Ok(snapshot) => {
                        sender.send_if_modified(|current| {
                            if *current == snapshot {
                                false
                            } else {
                                *current = snapshot;
                                true
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "Failed to re-fetch snapshot");
                    }
                }
            }

            subscriber.release(&channel);
            tracing::trace!(channel = %channel, "Follower stopped");
        });

        Ok(Feed::new(
            receiver,
            Subscription::new(move || {
                let _ = cancel_tx.send(());
            }),
        ))
    }
}

#[async_trait]
impl LivenessSink for RedisBackend {
    async fn publish_liveness(&self, subject_id: UserId, at: DateTime<Utc>) -> LivenessResult<()> {
        let updated = self
            .store
            .touch_last_seen(subject_id, at)
            .await
            .map_err(LivenessError::transport)?;

        if updated {
            self.notify(ChangeNotice::LastSeen { user_id: subject_id }).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TypingSink for RedisBackend {
    async fn publish_typing(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> LivenessResult<()> {
        self.store
            .set_typing(conversation_id, user_id, at)
            .await
            .map_err(LivenessError::transport)?;

        self.notify(ChangeNotice::Typing {
            conversation_id,
            user_id,
            active: true,
        })
        .await
    }

    async fn retract_typing(&self, conversation_id: ConversationId, user_id: UserId) -> LivenessResult<()> {
        let removed = self
            .store
            .remove_typing(conversation_id, user_id)
            .await
            .map_err(LivenessError::transport)?;

        if removed {
            self.notify(ChangeNotice::Typing {
                conversation_id,
                user_id,
                active: false,
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LivenessSource for RedisBackend {
    async fn subscribe_liveness(&self, subject_id: UserId) -> LivenessResult<Feed<Option<RawLiveness>>> {
        let store = self.store.clone();
        self.follow(PubSubChannel::Liveness(subject_id), move || {
            let store = store.clone();
            async move { store.last_seen(subject_id).await }
        })
        .await
    }
}

#[async_trait]
impl TypingSource for RedisBackend {
    async fn subscribe_typing(
        &self,
        conversation_id: ConversationId,
        excluding_user_id: UserId,
    ) -> LivenessResult<Feed<Vec<RawTypingAnnouncement>>> {
        let store = self.store.clone();
        self.follow(PubSubChannel::Typing(conversation_id), move || {
            let store = store.clone();
            async move {
                let mut rows = store.conversation_typing(conversation_id).await?;
                rows.retain(|row| row.user_id != excluding_user_id);
                rows.sort_by_key(|row| row.user_id);
                Ok(rows)
            }
        })
        .await
    }
}
