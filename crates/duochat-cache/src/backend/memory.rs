//! In-process backend.
//!
//! Rows live in `DashMap`s and every follower owns a `watch` sender in a
//! registry keyed by what it follows. Writes push fresh snapshots to the
//! matching followers. Typing rows never expire here; receivers drop stale
//! announcements themselves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use duochat_core::{
    parse_timestamp, ConversationId, Feed, LivenessError, LivenessResult, LivenessSink,
    LivenessSource, RawLiveness, RawTypingAnnouncement, Subscription, TypingSink, TypingSource,
    UserId,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::presence::encode_instant;

type LivenessWatcher = (u64, watch::Sender<Option<RawLiveness>>);

struct TypingWatcher {
    id: u64,
    excluding: UserId,
    sender: watch::Sender<Vec<RawTypingAnnouncement>>,
}

#[derive(Default)]
struct Inner {
    last_seen: DashMap<UserId, RawLiveness>,
    typing: DashMap<(ConversationId, UserId), RawTypingAnnouncement>,
    liveness_watchers: DashMap<UserId, Vec<LivenessWatcher>>,
    typing_watchers: DashMap<ConversationId, Vec<TypingWatcher>>,
    next_watcher: AtomicU64,
    unreachable: AtomicBool,
    liveness_writes: AtomicU64,
}

impl Inner {
    fn check_reachable(&self) -> LivenessResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(LivenessError::transport("backend unreachable"))
        } else {
            Ok(())
        }
    }

    fn typing_snapshot(&self, conversation_id: ConversationId, excluding: Option<UserId>) -> Vec<RawTypingAnnouncement> {
        let mut rows: Vec<RawTypingAnnouncement> = self
            .typing
            .iter()
            .filter(|entry| entry.key().0 == conversation_id && Some(entry.key().1) != excluding)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.user_id);
        rows
    }

    fn notify_liveness(&self, user_id: UserId) {
        let row = self.last_seen.get(&user_id).map(|row| row.clone());
        if let Some(watchers) = self.liveness_watchers.get(&user_id) {
            for (_, sender) in watchers.iter() {
                sender.send_replace(row.clone());
            }
        }
    }

    fn notify_typing(&self, conversation_id: ConversationId) {
        if let Some(watchers) = self.typing_watchers.get(&conversation_id) {
            for watcher in watchers.iter() {
                watcher
                    .sender
                    .send_replace(self.typing_snapshot(conversation_id, Some(watcher.excluding)));
            }
        }
    }
}

/// Replace the feed value if it differs
fn refresh<T: PartialEq>(sender: &watch::Sender<T>, latest: T) {
    sender.send_if_modified(|current| {
        if *current == latest {
            false
        } else {
            *current = latest;
            true
        }
    });
}

/// In-process liveness backend
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("last_seen_rows", &self.inner.last_seen.len())
            .field("typing_rows", &self.inner.typing.len())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the backend; while unreachable every
    /// publish and subscribe fails with a transport error
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Number of accepted liveness publishes
    pub fn liveness_writes(&self) -> u64 {
        self.inner.liveness_writes.load(Ordering::SeqCst)
    }

    /// Current last-seen row of a user
    pub fn last_seen(&self, user_id: UserId) -> Option<RawLiveness> {
        self.inner.last_seen.get(&user_id).map(|row| row.clone())
    }

    /// Every typing row in a conversation
    pub fn typing_snapshot(&self, conversation_id: ConversationId) -> Vec<RawTypingAnnouncement> {
        self.inner.typing_snapshot(conversation_id, None)
    }

    /// Store a row verbatim, bypassing validation and ordering
    pub fn put_raw_liveness(&self, row: RawLiveness) {
        let user_id = row.subject_id;
        self.inner.last_seen.insert(user_id, row);
        self.inner.notify_liveness(user_id);
    }

    /// Store a typing row verbatim
    pub fn put_raw_typing(&self, row: RawTypingAnnouncement) {
        let conversation_id = row.conversation_id;
        self.inner.typing.insert((conversation_id, row.user_id), row);
        self.inner.notify_typing(conversation_id);
    }

    /// Number of live followers across both kinds of feed
    pub fn watcher_count(&self) -> usize {
        let liveness: usize = self.inner.liveness_watchers.iter().map(|e| e.value().len()).sum();
        let typing: usize = self.inner.typing_watchers.iter().map(|e| e.value().len()).sum();
        liveness + typing
    }

    fn next_id(&self) -> u64 {
        self.inner.next_watcher.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl LivenessSink for MemoryBackend {
    async fn publish_liveness(&self, subject_id: UserId, at: DateTime<Utc>) -> LivenessResult<()> {
        self.inner.check_reachable()?;

        let written = {
            let mut entry = self
                .inner
                .last_seen
                .entry(subject_id)
                .or_insert_with(|| RawLiveness::new(subject_id, None));
            let stored = entry.last_seen.as_deref().and_then(parse_timestamp);
            if stored.is_some_and(|stored| stored >= at) {
                false
            } else {
                entry.last_seen = Some(encode_instant(at));
                true
            }
        };

        if written {
            self.inner.liveness_writes.fetch_add(1, Ordering::SeqCst);
            self.inner.notify_liveness(subject_id);
        } else {
            tracing::trace!(user_id = %subject_id, "Ignored out-of-order liveness publish");
        }
        Ok(())
    }
}

#[async_trait]
impl TypingSink for MemoryBackend {
    async fn publish_typing(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> LivenessResult<()> {
        self.inner.check_reachable()?;

        self.inner.typing.insert(
            (conversation_id, user_id),
            RawTypingAnnouncement::new(conversation_id, user_id, Some(encode_instant(at))),
        );
        self.inner.notify_typing(conversation_id);
        Ok(())
    }

    async fn retract_typing(&self, conversation_id: ConversationId, user_id: UserId) -> LivenessResult<()> {
        self.inner.check_reachable()?;

        if self.inner.typing.remove(&(conversation_id, user_id)).is_some() {
            self.inner.notify_typing(conversation_id);
        }
        Ok(())
    }
}

#[async_trait]
impl LivenessSource for MemoryBackend {
    async fn subscribe_liveness(&self, subject_id: UserId) -> LivenessResult<Feed<Option<RawLiveness>>> {
        self.inner.check_reachable()?;

        let id = self.next_id();
        let (sender, receiver) = watch::channel(self.last_seen(subject_id));
        {
            let mut watchers = self.inner.liveness_watchers.entry(subject_id).or_default();
            // Writers notify through this registry; re-read while holding it so
            // a write since the first read is not lost
            refresh(&sender, self.last_seen(subject_id));
            watchers.push((id, sender));
        }

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let subscription = Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .liveness_watchers
                    .remove_if_mut(&subject_id, |_, watchers| {
                        watchers.retain(|(watcher, _)| *watcher != id);
                        watchers.is_empty()
                    });
            }
        });

        Ok(Feed::new(receiver, subscription))
    }
}

#[async_trait]
impl TypingSource for MemoryBackend {
    async fn subscribe_typing(
        &self,
        conversation_id: ConversationId,
        excluding_user_id: UserId,
    ) -> LivenessResult<Feed<Vec<RawTypingAnnouncement>>> {
        self.inner.check_reachable()?;

        let id = self.next_id();
        let snapshot = || self.inner.typing_snapshot(conversation_id, Some(excluding_user_id));
        let (sender, receiver) = watch::channel(snapshot());
        {
            let mut watchers = self.inner.typing_watchers.entry(conversation_id).or_default();
            refresh(&sender, snapshot());
            watchers.push(TypingWatcher {
                id,
                excluding: excluding_user_id,
                sender,
            });
        }

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let subscription = Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .typing_watchers
                    .remove_if_mut(&conversation_id, |_, watchers| {
                        watchers.retain(|watcher| watcher.id != id);
                        watchers.is_empty()
                    });
            }
        });

        Ok(Feed::new(receiver, subscription))
    }
}
