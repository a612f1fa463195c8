//! Presence: evaluation, self-heartbeat and peer watching

mod evaluator;
mod heartbeat;
mod watch;

pub use evaluator::{Liveness, PresenceEvaluator, PresenceView, RosterEntry};
pub use heartbeat::{Heartbeat, HeartbeatHandle};
pub use watch::PresenceWatch;
