//! Test fixtures and data generators

use chrono::{DateTime, TimeZone, Utc};
use duochat_core::{ConversationId, RawLiveness, RawTypingAnnouncement, UserId};

/// Wall-clock origin of paused-time scenarios
pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Two users sharing one conversation
#[derive(Debug, Clone, Copy)]
pub struct ChatPair {
    pub alice: UserId,
    pub bob: UserId,
    pub conversation: ConversationId,
}

impl ChatPair {
    pub fn unique() -> Self {
        Self {
            alice: UserId::generate(),
            bob: UserId::generate(),
            conversation: ConversationId::generate(),
        }
    }
}

/// A liveness row whose timestamp cannot be parsed
pub fn malformed_liveness(user_id: UserId) -> RawLiveness {
    RawLiveness::new(user_id, Some("not a timestamp".to_string()))
}

/// A typing row whose timestamp cannot be parsed
pub fn malformed_typing(conversation_id: ConversationId, user_id: UserId) -> RawTypingAnnouncement {
    RawTypingAnnouncement::new(conversation_id, user_id, Some("soon".to_string()))
}
