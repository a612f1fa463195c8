//! Subscription handles and snapshot feeds

use parking_lot::Mutex;
use std::fmt;
use tokio::sync::watch;

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle that tears down a backend subscription.
///
/// `unsubscribe` runs the cancel action at most once; later calls, and the
/// implicit call on drop, do nothing.
pub struct Subscription {
    cancel: Mutex<Option<CancelFn>>,
}

impl Subscription {
    /// Create a handle around a cancel action
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A handle with nothing to cancel
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Stop the subscription (idempotent)
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether `unsubscribe` has not run yet
    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A stream of snapshots plus the handle that ends it.
///
/// Backed by a `watch` channel, so a slow reader sees the latest snapshot
/// and may skip intermediate ones.
#[derive(Debug)]
pub struct Feed<T> {
    receiver: watch::Receiver<T>,
    subscription: Subscription,
}

impl<T: Clone> Feed<T> {
    /// Create a feed
    pub fn new(receiver: watch::Receiver<T>, subscription: Subscription) -> Self {
        Self {
            receiver,
            subscription,
        }
    }

    /// The latest snapshot, marking it as seen
    pub fn current(&mut self) -> T {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next snapshot; `false` once the feed is closed
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Stop the feed (idempotent)
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    /// Whether the feed is still subscribed
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subscription.is_active());
        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        drop(subscription);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        drop(Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_subscription() {
        let subscription = Subscription::noop();
        assert!(!subscription.is_active());
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn test_feed_after_sender_closed() {
        let (tx, rx) = watch::channel(1u32);
        let mut feed = Feed::new(rx, Subscription::new(move || drop(tx)));

        assert_eq!(feed.current(), 1);
        feed.unsubscribe();
        // Closed channel: no panic, just "no more changes"
        assert!(!feed.changed().await);
        feed.unsubscribe();
    }

    #[tokio::test]
    async fn test_feed_sees_latest_snapshot() {
        let (tx, rx) = watch::channel(0u32);
        let keep_alive = tx.clone();
        let mut feed = Feed::new(rx, Subscription::new(move || drop(keep_alive)));

        tx.send_replace(1);
        tx.send_replace(2);
        assert!(feed.changed().await);
        assert_eq!(feed.current(), 2);
    }
}
