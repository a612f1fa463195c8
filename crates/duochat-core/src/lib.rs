//! # duochat-core
//!
//! Domain layer for the chat liveness kernel: identifiers, liveness signals,
//! typing announcements, the error taxonomy, and the ports through which the
//! kernel talks to the external realtime backend.
//! This crate has no dependency on any concrete backend.

pub mod clock;
pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use entities::{
    parse_timestamp, LivenessSignal, RawLiveness, RawTypingAnnouncement, TypingAnnouncement,
};
pub use error::{LivenessError, LivenessResult};
pub use traits::{
    Feed, LivenessBackend, LivenessSink, LivenessSource, Subscription, TypingSink, TypingSource,
};
pub use value_objects::{ConversationId, IdParseError, UserId};
