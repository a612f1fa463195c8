//! # duochat-cache
//!
//! Backends implementing the liveness ports.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Liveness Store**: `last_seen` rows and TTL-bounded typing keys
//! - **Pub/Sub**: Change notices that make subscribers re-fetch
//! - **Memory Backend**: In-process store with `watch` fan-out for tests and local runs
//!
//! ## Example
//!
//! ```ignore
//! use duochat_cache::{MemoryBackend, RedisBackend};
//!
//! // In-process
//! let backend = MemoryBackend::new();
//!
//! // Redis
//! let backend = RedisBackend::connect(&config.redis.unwrap(), &config.typing).await?;
//! backend.publish_liveness(user_id, Utc::now()).await?;
//! ```

pub mod backend;
pub mod pool;
pub mod presence;
pub mod pubsub;

// Re-export backend types
pub use backend::{MemoryBackend, RedisBackend};

// Re-export pool types
pub use pool::{RedisPool, RedisPoolConfig, RedisPoolError, RedisResult};

// Re-export presence types
pub use presence::{LivenessStore, TYPING_TTL};

// Re-export pubsub types
pub use pubsub::{
    ChangeNotice, PubSubChannel, Publisher, ReceivedMessage, Subscriber, SubscriberConfig,
    SubscriberError, SubscriberResult, LIVENESS_CHANNEL_PREFIX, TYPING_CHANNEL_PREFIX,
};
