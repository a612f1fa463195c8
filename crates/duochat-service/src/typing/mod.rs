//! Typing indicators: the local debounce machine and the peer observer

mod coordinator;
mod machine;
mod observer;

pub use coordinator::TypingCoordinator;
pub use machine::{TypingEffect, TypingMachine, TypingState};
pub use observer::{TypingObserver, TypingView};
