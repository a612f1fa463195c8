//! Redis Pub/Sub module.
//!
//! Change notices for liveness and typing rows.

mod channels;
mod publisher;
mod subscriber;

pub use channels::{PubSubChannel, LIVENESS_CHANNEL_PREFIX, TYPING_CHANNEL_PREFIX};
pub use publisher::{ChangeNotice, Publisher};
pub use subscriber::{
    ReceivedMessage, Subscriber, SubscriberConfig, SubscriberError, SubscriberResult,
};
