//! Live session - everything one signed-in client runs
//!
//! Starting a session starts the heartbeat (authenticated sessions only).
//! Opening a conversation yields the local typing coordinator and the peer
//! observer for it. Ending the session stops the heartbeat before returning.

use duochat_core::{ConversationId, LivenessResult, UserId};

use crate::context::SessionContext;
use crate::presence::{Heartbeat, HeartbeatHandle, PresenceWatch};
use crate::typing::{TypingCoordinator, TypingObserver, TypingView};

/// Liveness of one open conversation
#[derive(Debug)]
pub struct ConversationLiveness {
    /// Announces the local user's typing
    pub composer: TypingCoordinator,
    /// Follows the peer's typing
    pub peer: TypingObserver,
}

impl ConversationLiveness {
    pub fn conversation_id(&self) -> ConversationId {
        self.composer.conversation_id()
    }

    /// Peer typing state as of now
    pub fn peer_typing(&self) -> TypingView {
        self.peer.current()
    }

    /// Tear both sides down
    pub async fn close(&mut self) {
        self.composer.shutdown().await;
        self.peer.stop().await;
    }
}

/// A running client session
#[derive(Debug)]
pub struct LiveSession {
    ctx: SessionContext,
    heartbeat: Option<HeartbeatHandle>,
}

impl LiveSession {
    /// Start the session; the heartbeat runs only with an identity
    pub fn start(ctx: SessionContext) -> Self {
        let heartbeat = match Heartbeat::start(&ctx) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::info!(reason = e.code(), "Session started without heartbeat");
                None
            }
        };

        Self { ctx, heartbeat }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(HeartbeatHandle::is_running)
    }

    /// Follow a peer's presence
    pub fn watch_presence(&self, subject_id: UserId) -> PresenceWatch {
        PresenceWatch::start(&self.ctx, subject_id)
    }

    /// Start typing coordination for a conversation
    pub fn open_conversation(&self, conversation_id: ConversationId) -> LivenessResult<ConversationLiveness> {
        let composer = TypingCoordinator::start(&self.ctx, conversation_id)?;
        let peer = TypingObserver::start(&self.ctx, conversation_id)?;

        tracing::debug!(conversation_id = %conversation_id, "Conversation opened");

        Ok(ConversationLiveness { composer, peer })
    }

    /// End the session; no heartbeat is published after this returns
    pub async fn end(mut self) {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
        tracing::info!(user_id = ?self.ctx.self_id(), "Session ended");
    }
}
