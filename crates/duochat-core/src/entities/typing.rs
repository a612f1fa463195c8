//! Typing announcement - a retractable "I am composing" claim

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::liveness::parse_timestamp;
use crate::error::{LivenessError, LivenessResult};
use crate::value_objects::{ConversationId, UserId};

/// One user's transient composing state in one conversation.
///
/// At most one per `(conversation_id, user_id)`; a newer announcement
/// supersedes the older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingAnnouncement {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub announced_at: DateTime<Utc>,
}

impl TypingAnnouncement {
    /// Create a new announcement
    pub fn new(conversation_id: ConversationId, user_id: UserId, announced_at: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            user_id,
            announced_at,
        }
    }

    /// Key identifying the announcement slot
    pub fn key(&self) -> (ConversationId, UserId) {
        (self.conversation_id, self.user_id)
    }

    /// Still trusted at `now` given the receive-side staleness bound.
    /// Announcements stamped in the future count as fresh.
    pub fn is_live(&self, now: DateTime<Utc>, stale_after: std::time::Duration) -> bool {
        match (now - self.announced_at).to_std() {
            Ok(elapsed) => elapsed < stale_after,
            Err(_) => true,
        }
    }

    /// Instant at which the announcement stops being trusted
    pub fn expires_at(&self, stale_after: std::time::Duration) -> DateTime<Utc> {
        let stale = chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());
        self.announced_at + stale
    }
}

/// An announcement row as delivered by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTypingAnnouncement {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub updated_at: Option<String>,
}

impl RawTypingAnnouncement {
    /// Create a raw row
    pub fn new(conversation_id: ConversationId, user_id: UserId, updated_at: Option<String>) -> Self {
        Self {
            conversation_id,
            user_id,
            updated_at,
        }
    }

    /// Raw row for a well-formed announcement
    pub fn from_announcement(announcement: &TypingAnnouncement) -> Self {
        Self::new(
            announcement.conversation_id,
            announcement.user_id,
            Some(announcement.announced_at.to_rfc3339()),
        )
    }

    /// Validate into an announcement
    pub fn parse(&self) -> LivenessResult<TypingAnnouncement> {
        let raw = self
            .updated_at
            .as_deref()
            .ok_or_else(|| LivenessError::malformed(self.user_id, "missing updated_at"))?;

        parse_timestamp(raw)
            .map(|at| TypingAnnouncement::new(self.conversation_id, self.user_id, at))
            .ok_or_else(|| LivenessError::malformed(self.user_id, format!("unparseable updated_at {raw:?}")))
    }
}
