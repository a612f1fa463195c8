//! Backend ports (publish and subscribe sides)
//!
//! The domain layer defines what it needs; the cache crate provides the
//! in-memory and Redis implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::subscription::Feed;
use crate::entities::{RawLiveness, RawTypingAnnouncement};
use crate::error::LivenessResult;
use crate::value_objects::{ConversationId, UserId};

// ============================================================================
// Publish side
// ============================================================================

#[async_trait]
pub trait LivenessSink: Send + Sync {
    /// Publish a fresh liveness signal for `subject_id`
    async fn publish_liveness(&self, subject_id: UserId, at: DateTime<Utc>) -> LivenessResult<()>;
}

#[async_trait]
pub trait TypingSink: Send + Sync {
    /// Create or refresh the announcement for `(conversation_id, user_id)`
    async fn publish_typing(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> LivenessResult<()>;

    /// Delete the announcement for `(conversation_id, user_id)`
    async fn retract_typing(&self, conversation_id: ConversationId, user_id: UserId) -> LivenessResult<()>;
}

// ============================================================================
// Read side
// ============================================================================

#[async_trait]
pub trait LivenessSource: Send + Sync {
    /// Follow the liveness row of `subject_id`.
    ///
    /// The feed starts with the current row (`None` if never observed) and
    /// then carries eventually consistent snapshots.
    async fn subscribe_liveness(&self, subject_id: UserId) -> LivenessResult<Feed<Option<RawLiveness>>>;
}

#[async_trait]
pub trait TypingSource: Send + Sync {
    /// Follow the announcements of a conversation, excluding one user
    async fn subscribe_typing(
        &self,
        conversation_id: ConversationId,
        excluding_user_id: UserId,
    ) -> LivenessResult<Feed<Vec<RawTypingAnnouncement>>>;
}

/// A backend implementing every port
pub trait LivenessBackend: LivenessSink + TypingSink + LivenessSource + TypingSource {}

impl<T> LivenessBackend for T where T: LivenessSink + TypingSink + LivenessSource + TypingSource {}
