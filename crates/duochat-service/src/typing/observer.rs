//! Peer typing observer
//!
//! Each backend snapshot replaces the previous one wholesale. An
//! announcement counts only while younger than the staleness bound, so a
//! peer that vanished without retracting stops "typing" on its own. Age is
//! measured from the earlier of the peer's stamp and the local receipt, so a
//! peer clock running ahead cannot stretch the bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duochat_core::{
    Clock, ConversationId, LivenessResult, RawTypingAnnouncement, TypingAnnouncement, TypingSource,
    UserId,
};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::context::SessionContext;

/// What a UI shows for the peer's composing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TypingView {
    pub is_peer_typing: bool,
    /// Most recent live announcer
    pub typing_user: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observed {
    announcements: Vec<TypingAnnouncement>,
    view: TypingView,
}

/// Live "peer is typing" state for one conversation
#[derive(Debug)]
pub struct TypingObserver {
    conversation_id: ConversationId,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    observed: watch::Receiver<Observed>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TypingObserver {
    /// Start observing everyone but the session's identity
    pub fn start(ctx: &SessionContext, conversation_id: ConversationId) -> LivenessResult<Self> {
        let excluding = ctx.require_identity()?;
        let stale_after = ctx.typing_config().stale_after;
        let (sender, observed) = watch::channel(Observed {
            announcements: Vec::new(),
            view: TypingView::default(),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let follower = Follower {
            conversation_id,
            excluding,
            source: ctx.typing_source().clone(),
            clock: ctx.clock().clone(),
            stale_after,
            retry: ctx.typing_config().refresh_interval,
            receipts: Receipts::default(),
            announcements: Vec::new(),
            sender,
        };
        let task = tokio::spawn(follower.run(shutdown_rx));

        Ok(Self {
            conversation_id,
            clock: ctx.clock().clone(),
            stale_after,
            observed,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// The view as of now
    pub fn current(&self) -> TypingView {
        evaluate(&self.observed.borrow().announcements, self.clock.now(), self.stale_after)
    }

    pub fn is_peer_typing(&self) -> bool {
        self.current().is_peer_typing
    }

    /// Wait until the published view changes; `false` once stopped
    pub async fn changed(&mut self) -> bool {
        self.observed.changed().await.is_ok()
    }

    /// Stop observing (idempotent)
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TypingObserver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Validate a snapshot: drop malformed rows, rows from other conversations
/// and the excluded user, and keep the newest announcement per user.
pub fn collapse(
    rows: &[RawTypingAnnouncement],
    conversation_id: ConversationId,
    excluding: UserId,
) -> Vec<TypingAnnouncement> {
    let mut newest: HashMap<UserId, TypingAnnouncement> = HashMap::new();

    for row in rows {
        if row.conversation_id != conversation_id || row.user_id == excluding {
            continue;
        }
        match row.parse() {
            Ok(announcement) => {
                newest
                    .entry(announcement.user_id)
                    .and_modify(|kept| {
                        if announcement.announced_at > kept.announced_at {
                            *kept = announcement;
                        }
                    })
                    .or_insert(announcement);
            }
            Err(e) => tracing::debug!(conversation_id = %conversation_id, error = %e, "Ignoring malformed typing row"),
        }
    }

    let mut announcements: Vec<TypingAnnouncement> = newest.into_values().collect();
    announcements.sort_by_key(|a| a.user_id);
    announcements
}

/// Announcements already received, by announcer: the peer's stamp and the
/// instant the announcement is aged from
#[derive(Debug, Default)]
struct Receipts {
    seen: HashMap<UserId, (DateTime<Utc>, DateTime<Utc>)>,
}

impl Receipts {
    /// Rewrite each `announced_at` to `min(announced_at, first receipt)`.
    /// Redelivering an unchanged announcement keeps its first receipt.
    fn stamp(&mut self, announcements: Vec<TypingAnnouncement>, now: DateTime<Utc>) -> Vec<TypingAnnouncement> {
        let mut seen = HashMap::with_capacity(announcements.len());
        let stamped = announcements
            .into_iter()
            .map(|mut announcement| {
                let aged_from = match self.seen.get(&announcement.user_id) {
                    Some(&(stamp, aged_from)) if stamp == announcement.announced_at => aged_from,
                    _ => announcement.announced_at.min(now),
                };
                if aged_from < announcement.announced_at {
                    tracing::trace!(user_id = %announcement.user_id, "Typing announcement stamped ahead of the local clock");
                }
                seen.insert(announcement.user_id, (announcement.announced_at, aged_from));
                announcement.announced_at = aged_from;
                announcement
            })
            .collect();
        self.seen = seen;
        stamped
    }
}

/// Derive the view at `now`
pub fn evaluate(announcements: &[TypingAnnouncement], now: DateTime<Utc>, stale_after: Duration) -> TypingView {
    let typing_user = announcements
        .iter()
        .filter(|a| a.is_live(now, stale_after))
        .max_by_key(|a| a.announced_at)
        .map(|a| a.user_id);

    TypingView {
        is_peer_typing: typing_user.is_some(),
        typing_user,
    }
}

struct Follower {
    conversation_id: ConversationId,
    excluding: UserId,
    source: Arc<dyn TypingSource>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    retry: Duration,
    receipts: Receipts,
    announcements: Vec<TypingAnnouncement>,
    sender: watch::Sender<Observed>,
}

impl Follower {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        'subscribe: loop {
            let mut feed = match self
                .source
                .subscribe_typing(self.conversation_id, self.excluding)
                .await
            {
                Ok(feed) => feed,
                Err(e) => {
                    tracing::warn!(conversation_id = %self.conversation_id, error = %e, "Typing subscribe failed, retrying");
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break 'subscribe,
                        () = tokio::time::sleep(self.retry) => continue 'subscribe,
                    }
                }
            };

            self.apply(&feed.current());

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break 'subscribe,
                    open = feed.changed() => {
                        if !open {
                            tracing::warn!(conversation_id = %self.conversation_id, "Typing feed closed, resubscribing");
                            continue 'subscribe;
                        }
                        self.apply(&feed.current());
                    }
                    () = expiry(self.next_expiry()) => self.publish(),
                }
            }
        }

        tracing::debug!(conversation_id = %self.conversation_id, "Typing observer stopped");
    }

    fn apply(&mut self, rows: &[RawTypingAnnouncement]) {
        let collapsed = collapse(rows, self.conversation_id, self.excluding);
        self.announcements = self.receipts.stamp(collapsed, self.clock.now());
        self.publish();
    }

    fn publish(&self) {
        let view = evaluate(&self.announcements, self.clock.now(), self.stale_after);
        let next = Observed {
            announcements: self.announcements.clone(),
            view,
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

    /// When the earliest live announcement goes stale
    fn next_expiry(&self) -> Option<Instant> {
        let now = self.clock.now();
        self.announcements
            .iter()
            .filter(|a| a.is_live(now, self.stale_after))
            .map(|a| a.expires_at(self.stale_after))
            .min()
            .map(|at| Instant::now() + (at - now).to_std().unwrap_or_default())
    }
}

async fn expiry(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
