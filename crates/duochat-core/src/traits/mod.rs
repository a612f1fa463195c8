//! Ports - the interface between the kernel and the realtime backend

mod ports;
mod subscription;

pub use ports::{LivenessBackend, LivenessSink, LivenessSource, TypingSink, TypingSource};
pub use subscription::{Feed, Subscription};
