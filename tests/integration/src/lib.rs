//! Integration test utilities for the liveness kernel
//!
//! Scenarios run two sessions against one shared backend: the in-process
//! backend under paused tokio time, or Redis when `REDIS_URL` is set.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
