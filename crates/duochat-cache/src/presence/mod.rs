//! Liveness storage module.
//!
//! Keeps each user's `last_seen` row and the per-conversation typing keys.

mod liveness_store;

pub(crate) use liveness_store::encode_instant;
pub use liveness_store::{LivenessStore, TYPING_TTL};
