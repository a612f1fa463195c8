//! Redis Pub/Sub subscriber.
//!
//! One dedicated connection per process. Followers hold channels by
//! reference count; the Redis subscription exists while the count is above
//! zero. Every (re)connect resubscribes the held channels and emits a
//! resync message for each, since notices sent while disconnected are gone.
//! A new subscription emits one too: notices published before Redis
//! confirmed it were never delivered to this connection.

use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::pubsub::{ChangeNotice, PubSubChannel};

/// Error type for subscriber operations
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Subscriber listener has stopped")]
    Stopped,
}

/// Result type for subscriber operations
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// A message delivered to followers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub channel: PubSubChannel,
    /// `None` for resync markers and unrecognized payloads
    pub notice: Option<ChangeNotice>,
    /// Synthesized after a (re)connect
    pub resync: bool,
}

impl ReceivedMessage {
    fn from_redis(channel_name: &str, payload: &str) -> Self {
        Self {
            channel: PubSubChannel::parse(channel_name),
            notice: ChangeNotice::decode(payload),
            resync: false,
        }
    }

    /// A resync marker for `channel`
    #[must_use]
    pub fn resync(channel: PubSubChannel) -> Self {
        Self {
            channel,
            notice: None,
            resync: true,
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub redis_url: String,
    /// Capacity of the in-process fan-out; slow followers see `Lagged`
    pub fanout_capacity: usize,
    pub reconnect_delay: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            fanout_capacity: 1024,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl SubscriberConfig {
    #[must_use]
    pub fn for_url(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Self::default()
        }
    }
}

type Holders = Arc<Mutex<HashMap<String, usize>>>;

#[derive(Debug)]
enum Control {
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

/// How a connection ended
enum Disconnect {
    Shutdown,
    StreamEnded,
}

/// Shared Pub/Sub subscriber
#[derive(Debug)]
pub struct Subscriber {
    holders: Holders,
    fanout: broadcast::Sender<ReceivedMessage>,
    control: mpsc::UnboundedSender<Control>,
}

impl Subscriber {
    /// Validate the URL and start the listener task.
    ///
    /// Must be called inside a tokio runtime; the connection itself is made
    /// (and remade) by the listener.
    pub fn new(config: SubscriberConfig) -> SubscriberResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let (fanout, _) = broadcast::channel(config.fanout_capacity);
        let (control, control_rx) = mpsc::unbounded_channel();
        let holders = Holders::default();

        let listener = Listener {
            client,
            reconnect_delay: config.reconnect_delay,
            holders: holders.clone(),
            fanout: fanout.clone(),
            control: control_rx,
        };
        tokio::spawn(listener.run());

        Ok(Self {
            holders,
            fanout,
            control,
        })
    }

    /// Hold `channel`; the first holder subscribes
    pub fn acquire(&self, channel: &PubSubChannel) -> SubscriberResult<()> {
        let name = channel.name();
        let first = {
            let mut holders = self.holders.lock();
            let count = holders.entry(name.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            self.control
                .send(Control::Subscribe(name))
                .map_err(|_| SubscriberError::Stopped)?;
        }
        Ok(())
    }

    /// Let go of `channel`; the last holder unsubscribes. Extra releases
    /// are ignored.
    pub fn release(&self, channel: &PubSubChannel) {
        let name = channel.name();
        let last = {
            let mut holders = self.holders.lock();
            match holders.get_mut(&name) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    holders.remove(&name);
                    true
                }
                None => false,
            }
        };

        if last {
            let _ = self.control.send(Control::Unsubscribe(name));
        }
    }

    /// A receiver for every delivered message
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.fanout.subscribe()
    }

    /// Number of followers holding `channel`
    pub fn holders(&self, channel: &PubSubChannel) -> usize {
        self.holders.lock().get(&channel.name()).copied().unwrap_or(0)
    }

    /// Names of the held channels
    pub fn held_channels(&self) -> Vec<String> {
        self.holders.lock().keys().cloned().collect()
    }

    /// Stop the listener
    pub fn shutdown(&self) -> SubscriberResult<()> {
        self.control
            .send(Control::Shutdown)
            .map_err(|_| SubscriberError::Stopped)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
    }
}

struct Listener {
    client: Client,
    reconnect_delay: Duration,
    holders: Holders,
    fanout: broadcast::Sender<ReceivedMessage>,
    control: mpsc::UnboundedReceiver<Control>,
}

impl Listener {
    async fn run(mut self) {
        'reconnect: loop {
            match self.connection().await {
                Ok(Disconnect::Shutdown) => break,
                Ok(Disconnect::StreamEnded) => tracing::warn!("Pub/Sub stream ended, reconnecting"),
                Err(e) => tracing::warn!(error = %e, "Pub/Sub connection failed, reconnecting"),
            }

            // Held channels are resubscribed on connect, so only shutdown
            // matters while waiting
            let delay = tokio::time::sleep(self.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    () = &mut delay => continue 'reconnect,
                    cmd = self.control.recv() => {
                        if matches!(cmd, Some(Control::Shutdown) | None) {
                            break 'reconnect;
                        }
                    }
                }
            }
        }

        tracing::info!("Subscriber stopped");
    }

    /// Tell followers of `channel` to re-fetch
    fn resync(&self, channel: &str) {
        let _ = self.fanout.send(ReceivedMessage::resync(PubSubChannel::parse(channel)));
    }

    /// Serve one connection until it drops or shutdown is requested
    async fn connection(&mut self) -> SubscriberResult<Disconnect> {
        let mut pubsub = self.client.get_async_pubsub().await?;

        let held: Vec<String> = self.holders.lock().keys().cloned().collect();
        for channel in &held {
            pubsub.subscribe(channel).await?;
        }
        tracing::info!(channels = held.len(), "Subscriber connected");

        for channel in &held {
            self.resync(channel);
        }

        loop {
            // The message stream borrows the connection; control commands
            // need it back, so the stream lives for one select only
            let cmd = {
                let mut messages = pubsub.on_message();
                tokio::select! {
                    msg = messages.next() => {
                        let Some(msg) = msg else {
                            return Ok(Disconnect::StreamEnded);
                        };
                        let payload: String = msg.get_payload().unwrap_or_default();
                        tracing::trace!(channel = %msg.get_channel_name(), "Pub/Sub message");
                        // No followers is fine
                        let _ = self
                            .fanout
                            .send(ReceivedMessage::from_redis(msg.get_channel_name(), &payload));
                        continue;
                    }
                    cmd = self.control.recv() => cmd,
                }
            };

            match cmd {
                Some(Control::Subscribe(channel)) => {
                    // Released again before we got here
                    if self.holders.lock().contains_key(&channel) {
                        pubsub.subscribe(&channel).await?;
                        tracing::debug!(channel = %channel, "Subscribed");
                        self.resync(&channel);
                    }
                }
                Some(Control::Unsubscribe(channel)) => {
                    // Re-acquired before we got here
                    if !self.holders.lock().contains_key(&channel) {
                        pubsub.unsubscribe(&channel).await?;
                        tracing::debug!(channel = %channel, "Unsubscribed");
                    }
                }
                Some(Control::Shutdown) | None => return Ok(Disconnect::Shutdown),
            }
        }
    }
}
