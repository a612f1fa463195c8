//! Typing announcement state machine
//!
//! Pure transitions: each event returns the effects a driver must run.
//! Time is passed in, so the machine never touches a clock or a timer.

use std::time::Duration;

use duochat_common::TypingConfig;
use tokio::time::Instant;

/// Composition state of the local user in one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Idle,
    Announcing {
        /// When the quiet-period timer fires
        deadline: Instant,
        /// Last time the announcement was (re)published
        last_published: Instant,
    },
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingEffect {
    /// Publish (or refresh) the announcement
    Publish,
    /// Delete the announcement
    Retract,
    /// (Re)arm the single expiry timer
    ArmTimer(Instant),
    /// Disarm the expiry timer
    CancelTimer,
}

/// Debounce state machine for one `(conversation, user)` pair
#[derive(Debug, Clone)]
pub struct TypingMachine {
    state: TypingState,
    quiet_period: Duration,
    refresh_interval: Duration,
}

impl TypingMachine {
    pub fn new(config: &TypingConfig) -> Self {
        Self {
            state: TypingState::Idle,
            quiet_period: config.quiet_period,
            refresh_interval: config.refresh_interval,
        }
    }

    pub fn state(&self) -> TypingState {
        self.state
    }

    pub fn is_announcing(&self) -> bool {
        matches!(self.state, TypingState::Announcing { .. })
    }

    /// Pending expiry, if announcing
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TypingState::Announcing { deadline, .. } => Some(deadline),
            TypingState::Idle => None,
        }
    }

    /// The composer text changed. Empty text means the composer was cleared.
    pub fn on_input(&mut self, text: &str, now: Instant) -> Vec<TypingEffect> {
        if text.is_empty() {
            return self.on_stop();
        }

        let deadline = now + self.quiet_period;
        match self.state {
            TypingState::Idle => {
                self.state = TypingState::Announcing {
                    deadline,
                    last_published: now,
                };
                vec![TypingEffect::Publish, TypingEffect::ArmTimer(deadline)]
            }
            TypingState::Announcing { last_published, .. } => {
                let mut effects = Vec::with_capacity(2);
                let last_published = if now.saturating_duration_since(last_published) >= self.refresh_interval {
                    effects.push(TypingEffect::Publish);
                    now
                } else {
                    last_published
                };

                self.state = TypingState::Announcing {
                    deadline,
                    last_published,
                };
                effects.push(TypingEffect::ArmTimer(deadline));
                effects
            }
        }
    }

    /// The message was sent
    pub fn on_submit(&mut self) -> Vec<TypingEffect> {
        self.on_stop()
    }

    /// Explicit stop (composer cleared, focus lost)
    pub fn on_stop(&mut self) -> Vec<TypingEffect> {
        match self.state {
            TypingState::Announcing { .. } => {
                self.state = TypingState::Idle;
                vec![TypingEffect::CancelTimer, TypingEffect::Retract]
            }
            TypingState::Idle => Vec::new(),
        }
    }

    /// The expiry timer fired. A firing for an already re-armed deadline
    /// is ignored.
    pub fn on_deadline(&mut self, now: Instant) -> Vec<TypingEffect> {
        match self.state {
            TypingState::Announcing { deadline, .. } if now >= deadline => {
                self.state = TypingState::Idle;
                vec![TypingEffect::Retract]
            }
            _ => Vec::new(),
        }
    }

    /// The conversation view is going away
    pub fn on_teardown(&mut self) -> Vec<TypingEffect> {
        match self.state {
            TypingState::Announcing { .. } => {
                self.state = TypingState::Idle;
                vec![TypingEffect::CancelTimer]
            }
            TypingState::Idle => Vec::new(),
        }
    }
}
