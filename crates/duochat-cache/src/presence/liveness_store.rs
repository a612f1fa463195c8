//! Liveness rows in Redis.
//!
//! `last_seen:{user}` holds the newest RFC 3339 instant the user was seen
//! and never expires. `typing:{conversation}:{user}` holds the instant of
//! the latest typing announcement and expires after the typing TTL
//! ([`TYPING_TTL`] unless configured), so a crashed client cannot leave an
//! announcement behind forever.

use chrono::{DateTime, SecondsFormat, Utc};
use duochat_core::{ConversationId, RawLiveness, RawTypingAnnouncement, UserId};
use std::time::Duration;

use crate::pool::{RedisPool, RedisResult};

/// Key prefix for last-seen rows
const LAST_SEEN_PREFIX: &str = "last_seen:";
/// Key prefix for typing announcements
const TYPING_PREFIX: &str = "typing:";

/// Typing announcement TTL
pub const TYPING_TTL: Duration = Duration::from_secs(10);

/// Keep the newer of the stored and incoming instants.
/// Values are fixed-width UTC strings, so string order is time order.
const TOUCH_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if (not current) or current < ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[1])
    return 1
end
return 0
";

/// Format an instant the way the store writes it
pub(crate) fn encode_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Liveness store
#[derive(Debug, Clone)]
pub struct LivenessStore {
    pool: RedisPool,
    typing_ttl: Duration,
}

impl LivenessStore {
    /// Create a new liveness store
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            typing_ttl: TYPING_TTL,
        }
    }

    /// Override the typing key TTL
    #[must_use]
    pub fn with_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = ttl;
        self
    }

    pub fn typing_ttl(&self) -> Duration {
        self.typing_ttl
    }

    /// The underlying pool
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    fn last_seen_key(user_id: UserId) -> String {
        format!("{LAST_SEEN_PREFIX}{user_id}")
    }

    fn typing_key(conversation_id: ConversationId, user_id: UserId) -> String {
        format!("{TYPING_PREFIX}{conversation_id}:{user_id}")
    }

    fn typing_pattern(conversation_id: ConversationId) -> String {
        format!("{TYPING_PREFIX}{conversation_id}:*")
    }

    /// Record that `user_id` was seen at `at`; an older instant never
    /// overwrites a newer one. Returns whether the row changed.
    pub async fn touch_last_seen(&self, user_id: UserId, at: DateTime<Utc>) -> RedisResult<bool> {
        let key = Self::last_seen_key(user_id);
        let mut conn = self.pool.connection().await?;

        let updated: i32 = redis::Script::new(TOUCH_SCRIPT)
            .key(&key)
            .arg(encode_instant(at))
            .invoke_async(&mut conn)
            .await?;

        tracing::trace!(user_id = %user_id, updated = updated == 1, "Touched last_seen");

        Ok(updated == 1)
    }

    /// Get the raw last-seen row (`None` if the user was never seen)
    pub async fn last_seen(&self, user_id: UserId) -> RedisResult<Option<RawLiveness>> {
        let key = Self::last_seen_key(user_id);
        let value = self.pool.fetch(&key).await?;
        Ok(value.map(|raw| RawLiveness::new(user_id, Some(raw))))
    }

    /// Create or refresh a typing announcement
    pub async fn set_typing(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> RedisResult<()> {
        let key = Self::typing_key(conversation_id, user_id);
        self.pool
            .put(&key, &encode_instant(at), Some(self.typing_ttl))
            .await?;

        tracing::trace!(
            user_id = %user_id,
            conversation_id = %conversation_id,
            "Set typing announcement"
        );

        Ok(())
    }

    /// Remove a typing announcement
    pub async fn remove_typing(&self, conversation_id: ConversationId, user_id: UserId) -> RedisResult<bool> {
        let key = Self::typing_key(conversation_id, user_id);
        self.pool.remove(&key).await
    }

    /// Get every live typing announcement in a conversation
    pub async fn conversation_typing(
        &self,
        conversation_id: ConversationId,
    ) -> RedisResult<Vec<RawTypingAnnouncement>> {
        let keys = self
            .pool
            .keys_matching(&Self::typing_pattern(conversation_id), 100)
            .await?;

        let values = self.pool.fetch_many(&keys).await?;

        let mut typing = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            // Expired between SCAN and MGET
            let Some(value) = value else { continue };

            match Self::user_from_typing_key(conversation_id, key) {
                Some(user_id) => typing.push(RawTypingAnnouncement::new(conversation_id, user_id, Some(value))),
                None => tracing::debug!(key = %key, "Skipping typing key with unparseable user id"),
            }
        }

        Ok(typing)
    }

    fn user_from_typing_key(conversation_id: ConversationId, key: &str) -> Option<UserId> {
        let prefix = format!("{TYPING_PREFIX}{conversation_id}:");
        key.strip_prefix(&prefix)
            .and_then(|suffix| UserId::parse(suffix).ok())
    }
}
