//! Self-heartbeat
//!
//! Publishes the local user's liveness once at start and then on a fixed
//! period until stopped. A failed publish is logged and the next tick tries
//! again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use duochat_core::{LivenessResult, UserId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::context::SessionContext;

/// Heartbeat launcher
pub struct Heartbeat;

impl Heartbeat {
    /// Start beating for the session's identity.
    ///
    /// Fails with `Unauthenticated` when the session has no identity.
    pub fn start(ctx: &SessionContext) -> LivenessResult<HeartbeatHandle> {
        let user_id = ctx.require_identity()?;
        let period = ctx.presence_config().heartbeat_interval;
        let sink = ctx.liveness_sink().clone();
        let clock = ctx.clock().clone();
        let beats = Arc::new(AtomicU64::new(0));

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let counter = beats.clone();

        let task = tokio::spawn(async move {
            // First tick completes immediately
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let at = clock.now();
                        match sink.publish_liveness(user_id, at).await {
                            Ok(()) => {
                                counter.fetch_add(1, Ordering::Relaxed);
                                tracing::trace!(user_id = %user_id, at = %at, "Heartbeat published");
                            }
                            Err(e) => {
                                tracing::warn!(
                                    user_id = %user_id,
                                    error = %e,
                                    code = e.code(),
                                    "Heartbeat publish failed"
                                );
                            }
                        }
                    }
                }
            }

            tracing::debug!(user_id = %user_id, "Heartbeat stopped");
        });

        tracing::info!(user_id = %user_id, period_secs = period.as_secs(), "Heartbeat started");

        Ok(HeartbeatHandle {
            user_id,
            beats,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Owner of a running heartbeat. Dropping it aborts the task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    user_id: UserId,
    beats: Arc<AtomicU64>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Successful publishes so far
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop and wait for the task; no beat is published after this returns.
    /// Calling it again does nothing.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(user_id = %self.user_id, error = %e, "Heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
