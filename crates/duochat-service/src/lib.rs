//! # duochat-service
//!
//! Application layer of the liveness kernel.
//!
//! - [`PresenceEvaluator`] turns a last-seen instant into a classification
//!   and a label, always against the current clock.
//! - [`Heartbeat`] keeps the local user's own last-seen fresh.
//! - [`PresenceWatch`] follows a peer's last-seen and republishes its view.
//! - [`TypingCoordinator`] debounces the local user's typing announcements.
//! - [`TypingObserver`] derives "peer is typing" from the peer's announcements.
//! - [`LiveSession`] wires them together for one signed-in user.

pub mod context;
pub mod display;
pub mod presence;
pub mod session;
pub mod typing;

pub use context::{SessionContext, SessionContextBuilder};
pub use display::{format_chat_list_time, format_message_time, truncate_text};
pub use presence::{
    Heartbeat, HeartbeatHandle, Liveness, PresenceEvaluator, PresenceView, PresenceWatch,
    RosterEntry,
};
pub use session::{ConversationLiveness, LiveSession};
pub use typing::{
    TypingCoordinator, TypingEffect, TypingMachine, TypingObserver, TypingState, TypingView,
};
