//! Pub/Sub channel definitions.
//!
//! One channel per watched user and one per conversation. Messages on them
//! are change notices only; receivers re-read the store.

use duochat_core::{ConversationId, UserId};

/// Channel prefix for last-seen changes of one user
pub const LIVENESS_CHANNEL_PREFIX: &str = "liveness:";
/// Channel prefix for typing changes in one conversation
pub const TYPING_CHANNEL_PREFIX: &str = "typing:";

/// Pub/Sub channel types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PubSubChannel {
    /// Last-seen changes for a user
    Liveness(UserId),
    /// Typing changes in a conversation
    Typing(ConversationId),
    /// Custom channel name
    Custom(String),
}

impl PubSubChannel {
    /// Get the Redis channel name
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Liveness(id) => format!("{LIVENESS_CHANNEL_PREFIX}{id}"),
            Self::Typing(id) => format!("{TYPING_CHANNEL_PREFIX}{id}"),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Parse a channel name back to a `PubSubChannel`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if let Some(id) = name
            .strip_prefix(LIVENESS_CHANNEL_PREFIX)
            .and_then(|id| UserId::parse(id).ok())
        {
            return Self::Liveness(id);
        }

        if let Some(id) = name
            .strip_prefix(TYPING_CHANNEL_PREFIX)
            .and_then(|id| ConversationId::parse(id).ok())
        {
            return Self::Typing(id);
        }

        Self::Custom(name.to_string())
    }
}

impl std::fmt::Display for PubSubChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let user_id = UserId::parse("6f1c1a4e-8d2b-4c57-9a34-1f0e2d3c4b5a").unwrap();
        let conversation_id = ConversationId::parse("0b8e9d55-3a71-4f26-b0f4-7c2d9e6a1b38").unwrap();

        assert_eq!(
            PubSubChannel::Liveness(user_id).name(),
            "liveness:6f1c1a4e-8d2b-4c57-9a34-1f0e2d3c4b5a"
        );
        assert_eq!(
            PubSubChannel::Typing(conversation_id).to_string(),
            "typing:0b8e9d55-3a71-4f26-b0f4-7c2d9e6a1b38"
        );
        assert_eq!(PubSubChannel::Custom("ops".to_string()).name(), "ops");
    }

    #[test]
    fn test_channel_parse() {
        let user_id = UserId::generate();
        let conversation_id = ConversationId::generate();

        assert_eq!(
            PubSubChannel::parse(&format!("liveness:{user_id}")),
            PubSubChannel::Liveness(user_id)
        );
        assert_eq!(
            PubSubChannel::parse(&format!("typing:{conversation_id}")),
            PubSubChannel::Typing(conversation_id)
        );
        assert_eq!(
            PubSubChannel::parse("liveness:42"),
            PubSubChannel::Custom("liveness:42".to_string())
        );
    }
}
