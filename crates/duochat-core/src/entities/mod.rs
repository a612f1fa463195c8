//! Domain entities - the two kinds of signal the kernel reasons about

mod liveness;
mod typing;

pub use liveness::{parse_timestamp, LivenessSignal, RawLiveness};
pub use typing::{RawTypingAnnouncement, TypingAnnouncement};
