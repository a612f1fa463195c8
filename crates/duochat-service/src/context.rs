//! Session context - dependency container for one client session
//!
//! Holds the local identity, the clock, the backend ports and the timing
//! configuration. Every component takes a clone at construction; nothing
//! reads a process-wide "current user".

use std::fmt;
use std::sync::Arc;

use duochat_common::{AppConfig, PresenceConfig, TypingConfig};
use duochat_core::{
    Clock, LivenessBackend, LivenessError, LivenessResult, LivenessSink, LivenessSource,
    SystemClock, TypingSink, TypingSource, UserId,
};

use crate::presence::PresenceEvaluator;

/// Session context containing all dependencies
#[derive(Clone)]
pub struct SessionContext {
    self_id: Option<UserId>,
    clock: Arc<dyn Clock>,

    // Ports
    liveness_sink: Arc<dyn LivenessSink>,
    typing_sink: Arc<dyn TypingSink>,
    liveness_source: Arc<dyn LivenessSource>,
    typing_source: Arc<dyn TypingSource>,

    // Timing
    presence: PresenceConfig,
    typing: TypingConfig,
}

impl SessionContext {
    /// Context with default clock and timings
    pub fn new<B>(backend: Arc<B>, self_id: Option<UserId>) -> Self
    where
        B: LivenessBackend + 'static,
    {
        let builder = SessionContextBuilder::new(backend);
        match self_id {
            Some(id) => builder.self_id(id).build(),
            None => builder.build(),
        }
    }

    /// Start building a context over `backend`
    pub fn builder<B>(backend: Arc<B>) -> SessionContextBuilder
    where
        B: LivenessBackend + 'static,
    {
        SessionContextBuilder::new(backend)
    }

    // === Identity ===

    /// The signed-in user, if any
    pub fn self_id(&self) -> Option<UserId> {
        self.self_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.self_id.is_some()
    }

    /// The signed-in user, or `Unauthenticated`
    pub fn require_identity(&self) -> LivenessResult<UserId> {
        self.self_id.ok_or(LivenessError::Unauthenticated)
    }

    // === Clock ===

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // === Ports ===

    pub fn liveness_sink(&self) -> &Arc<dyn LivenessSink> {
        &self.liveness_sink
    }

    pub fn typing_sink(&self) -> &Arc<dyn TypingSink> {
        &self.typing_sink
    }

    pub fn liveness_source(&self) -> &Arc<dyn LivenessSource> {
        &self.liveness_source
    }

    pub fn typing_source(&self) -> &Arc<dyn TypingSource> {
        &self.typing_source
    }

    // === Config ===

    pub fn presence_config(&self) -> &PresenceConfig {
        &self.presence
    }

    pub fn typing_config(&self) -> &TypingConfig {
        &self.typing
    }

    /// An evaluator bound to this session's clock and window
    pub fn evaluator(&self) -> PresenceEvaluator {
        PresenceEvaluator::new(self.clock.clone(), &self.presence)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("self_id", &self.self_id)
            .field("clock", &self.clock)
            .field("presence", &self.presence)
            .field("typing", &self.typing)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionContext`]
pub struct SessionContextBuilder {
    self_id: Option<UserId>,
    clock: Arc<dyn Clock>,
    liveness_sink: Arc<dyn LivenessSink>,
    typing_sink: Arc<dyn TypingSink>,
    liveness_source: Arc<dyn LivenessSource>,
    typing_source: Arc<dyn TypingSource>,
    presence: PresenceConfig,
    typing: TypingConfig,
}

impl SessionContextBuilder {
    /// Use `backend` for every port
    pub fn new<B>(backend: Arc<B>) -> Self
    where
        B: LivenessBackend + 'static,
    {
        Self {
            self_id: None,
            clock: Arc::new(SystemClock),
            liveness_sink: backend.clone(),
            typing_sink: backend.clone(),
            liveness_source: backend.clone(),
            typing_source: backend,
            presence: PresenceConfig::default(),
            typing: TypingConfig::default(),
        }
    }

    /// Set the signed-in user
    pub fn self_id(mut self, self_id: UserId) -> Self {
        self.self_id = Some(self_id);
        self
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the liveness sink
    pub fn liveness_sink(mut self, sink: Arc<dyn LivenessSink>) -> Self {
        self.liveness_sink = sink;
        self
    }

    /// Replace the typing sink
    pub fn typing_sink(mut self, sink: Arc<dyn TypingSink>) -> Self {
        self.typing_sink = sink;
        self
    }

    /// Set presence timings
    pub fn presence_config(mut self, presence: PresenceConfig) -> Self {
        self.presence = presence;
        self
    }

    /// Set typing timings
    pub fn typing_config(mut self, typing: TypingConfig) -> Self {
        self.typing = typing;
        self
    }

    /// Take both timing sections from the application config
    pub fn app_config(self, config: &AppConfig) -> Self {
        self.presence_config(config.presence.clone())
            .typing_config(config.typing)
    }

    /// Build the context
    pub fn build(self) -> SessionContext {
        SessionContext {
            self_id: self.self_id,
            clock: self.clock,
            liveness_sink: self.liveness_sink,
            typing_sink: self.typing_sink,
            liveness_source: self.liveness_source,
            typing_source: self.typing_source,
            presence: self.presence,
            typing: self.typing,
        }
    }
}
