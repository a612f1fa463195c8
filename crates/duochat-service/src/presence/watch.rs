//! Following a peer's presence
//!
//! A background task keeps the newest valid last-seen of one user and
//! republishes the derived view whenever a snapshot arrives or the refresh
//! period passes (labels age even without new signals). Readers always get
//! a view computed against the clock at read time.

use chrono::{DateTime, Utc};
use duochat_core::{LivenessSignal, LivenessSource, RawLiveness, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::context::SessionContext;
use crate::presence::{PresenceEvaluator, PresenceView};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observed {
    last_seen: Option<DateTime<Utc>>,
    view: PresenceView,
}

/// Live presence of one peer
#[derive(Debug)]
pub struct PresenceWatch {
    subject_id: UserId,
    evaluator: PresenceEvaluator,
    observed: watch::Receiver<Observed>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PresenceWatch {
    /// Start following `subject_id`. Subscription failures are retried every
    /// refresh period; until then the peer reads as offline.
    pub fn start(ctx: &SessionContext, subject_id: UserId) -> Self {
        let evaluator = ctx.evaluator();
        let (sender, observed) = watch::channel(Observed {
            last_seen: None,
            view: PresenceView::offline(),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let follower = Follower {
            subject_id,
            source: ctx.liveness_source().clone(),
            evaluator: evaluator.clone(),
            refresh: ctx.presence_config().refresh_interval,
            latest: None,
            sender,
        };
        let task = tokio::spawn(follower.run(shutdown_rx));

        Self {
            subject_id,
            evaluator,
            observed,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn subject_id(&self) -> UserId {
        self.subject_id
    }

    /// Newest valid last-seen instant observed so far
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.observed.borrow().last_seen
    }

    /// The view as of now
    pub fn current(&self) -> PresenceView {
        self.evaluator.view(self.last_seen())
    }

    pub fn is_online(&self) -> bool {
        self.evaluator.is_online(self.last_seen())
    }

    /// Wait until the published view changes; `false` once stopped
    pub async fn changed(&mut self) -> bool {
        self.observed.changed().await.is_ok()
    }

    /// Stop following (idempotent)
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PresenceWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Follower {
    subject_id: UserId,
    source: Arc<dyn LivenessSource>,
    evaluator: PresenceEvaluator,
    refresh: Duration,
    latest: Option<LivenessSignal>,
    sender: watch::Sender<Observed>,
}

impl Follower {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + self.refresh, self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'subscribe: loop {
            let mut feed = match self.source.subscribe_liveness(self.subject_id).await {
                Ok(feed) => feed,
                Err(e) => {
                    tracing::warn!(user_id = %self.subject_id, error = %e, "Presence subscribe failed, retrying");
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break 'subscribe,
                        () = tokio::time::sleep(self.refresh) => continue 'subscribe,
                    }
                }
            };

            self.apply(feed.current());

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break 'subscribe,
                    open = feed.changed() => {
                        if !open {
                            tracing::warn!(user_id = %self.subject_id, "Presence feed closed, resubscribing");
                            continue 'subscribe;
                        }
                        self.apply(feed.current());
                    }
                    _ = ticker.tick() => self.publish(),
                }
            }
        }

        tracing::debug!(user_id = %self.subject_id, "Presence watch stopped");
    }

    /// Merge a snapshot. An absent row leaves the state untouched; a
    /// malformed row never replaces a valid one.
    fn apply(&mut self, row: Option<RawLiveness>) {
        if let Some(row) = row {
            if row.subject_id == self.subject_id {
                match row.parse() {
                    Ok(signal) => self.latest = Some(LivenessSignal::latest(self.latest, signal)),
                    Err(e) => tracing::debug!(user_id = %self.subject_id, error = %e, "Ignoring malformed liveness row"),
                }
            } else {
                tracing::debug!(
                    user_id = %self.subject_id,
                    row_user_id = %row.subject_id,
                    "Ignoring liveness row for another user"
                );
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let last_seen = self.latest.map(|signal| signal.observed_at);
        let next = Observed {
            last_seen,
            view: self.evaluator.view(last_seen),
        };
        self.sender.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
