//! Error types for the liveness kernel

mod liveness_error;

pub use liveness_error::{LivenessError, LivenessResult};
