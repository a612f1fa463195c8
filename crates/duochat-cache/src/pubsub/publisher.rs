//! Change notices and their publisher.
//!
//! A notice names the row that moved and nothing else. Followers re-read
//! the store when one arrives, so a lost or duplicated notice costs at most
//! one extra snapshot.

use duochat_core::{ConversationId, UserId};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::pool::{RedisPool, RedisResult};
use crate::pubsub::PubSubChannel;

/// Which row changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeNotice {
    /// `last_seen` moved forward
    LastSeen { user_id: UserId },
    /// A typing key was written (`active`) or deleted
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
        active: bool,
    },
}

impl ChangeNotice {
    /// Channel the notice travels on
    #[must_use]
    pub fn channel(&self) -> PubSubChannel {
        match self {
            Self::LastSeen { user_id } => PubSubChannel::Liveness(*user_id),
            Self::Typing { conversation_id, .. } => PubSubChannel::Typing(*conversation_id),
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a payload; anything unrecognized is `None`
    #[must_use]
    pub fn decode(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}

/// Publishes change notices on the shared pool
#[derive(Debug, Clone)]
pub struct Publisher {
    pool: RedisPool,
}

impl Publisher {
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Publish `notice`; returns how many connections received it
    pub async fn announce(&self, notice: &ChangeNotice) -> RedisResult<u32> {
        let channel = notice.channel();
        let payload = notice.encode()?;

        let mut conn = self.pool.connection().await?;
        let receivers: u32 = conn.publish(channel.name(), payload).await?;

        tracing::trace!(channel = %channel, receivers, "Change notice published");
        Ok(receivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_wire_format() {
        let user_id = UserId::parse("6f1c1a4e-8d2b-4c57-9a34-1f0e2d3c4b5a").unwrap();
        let notice = ChangeNotice::LastSeen { user_id };

        assert_eq!(
            notice.encode().unwrap(),
            r#"{"type":"LAST_SEEN","user_id":"6f1c1a4e-8d2b-4c57-9a34-1f0e2d3c4b5a"}"#
        );
    }

    #[test]
    fn test_notice_channel() {
        let conversation_id = ConversationId::generate();
        let notice = ChangeNotice::Typing {
            conversation_id,
            user_id: UserId::generate(),
            active: false,
        };

        assert_eq!(notice.channel(), PubSubChannel::Typing(conversation_id));
        assert_eq!(ChangeNotice::decode(&notice.encode().unwrap()), Some(notice));
    }

    #[test]
    fn test_unknown_payload() {
        assert_eq!(ChangeNotice::decode("ping"), None);
        assert_eq!(ChangeNotice::decode(r#"{"type":"RELOAD"}"#), None);
    }
}
