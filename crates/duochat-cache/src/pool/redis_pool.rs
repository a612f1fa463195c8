//! Redis connection pool (deadpool-redis).
//!
//! Liveness rows are bare RFC 3339 strings, so the helpers move text. Pool
//! waits are bounded: an unreachable Redis turns into an error the caller
//! can log and retry instead of a stuck heartbeat.

use deadpool_redis::{Config, Connection, Pool, PoolError, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

/// Redis pool configuration
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    /// Connection URL, e.g. `redis://localhost:6379`
    pub url: String,
    pub max_connections: usize,
    /// Upper bound for checking out or opening a connection
    pub acquire_timeout: Duration,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&duochat_common::RedisConfig> for RedisPoolConfig {
    fn from(config: &duochat_common::RedisConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections as usize,
            ..Self::default()
        }
    }
}

/// Error type for Redis pool operations
#[derive(Debug, thiserror::Error)]
pub enum RedisPoolError {
    #[error("Failed to create Redis pool: {0}")]
    CreatePool(String),

    #[error("No Redis connection available: {0}")]
    Checkout(#[from] PoolError),

    #[error("Redis command error: {0}")]
    Command(#[from] redis::RedisError),

    #[error("Failed to encode notice: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for Redis pool operations
pub type RedisResult<T> = Result<T, RedisPoolError>;

/// Shared handle to the connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
    url: String,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("url", &redact(&self.url))
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisPool {
    /// Build the pool. No connection is opened until first use.
    pub fn new(config: RedisPoolConfig) -> RedisResult<Self> {
        let pool = Config::from_url(&config.url)
            .builder()
            .map_err(|e| RedisPoolError::CreatePool(e.to_string()))?
            .max_size(config.max_connections)
            .wait_timeout(Some(config.acquire_timeout))
            .create_timeout(Some(config.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| RedisPoolError::CreatePool(e.to_string()))?;

        tracing::info!(
            url = %redact(&config.url),
            max_connections = config.max_connections,
            "Redis pool created"
        );

        Ok(Self {
            pool,
            url: config.url,
        })
    }

    pub fn from_config(config: &duochat_common::RedisConfig) -> RedisResult<Self> {
        Self::new(RedisPoolConfig::from(config))
    }

    /// URL the pool connects to; the pub/sub listener opens its own connection
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check out a pooled connection
    pub async fn connection(&self) -> RedisResult<Connection> {
        Ok(self.pool.get().await?)
    }

    /// Round-trip a `PING`
    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Write `value` under `key`, expiring after `ttl` when given
    pub async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> RedisResult<()> {
        let mut conn = self.connection().await?;
        if let Some(ttl) = ttl {
            // PSETEX rejects zero
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            conn.pset_ex::<_, _, ()>(key, value, ttl_ms).await?;
        } else {
            conn.set::<_, _, ()>(key, value).await?;
        }
        Ok(())
    }

    pub async fn fetch(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    /// `MGET`; the result lines up with `keys`
    pub async fn fetch_many(&self, keys: &[String]) -> RedisResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        Ok(redis::cmd("MGET").arg(keys).query_async(&mut conn).await?)
    }

    /// Delete `key`; `true` if it existed
    pub async fn remove(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.connection().await?;
        let removed: u32 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Every key matching `pattern`, walked with `SCAN` in `batch`-sized steps
    pub async fn keys_matching(&self, pattern: &str, batch: usize) -> RedisResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut found = Vec::new();
        let mut cursor = 0_u64;

        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch)
                .query_async(&mut conn)
                .await?;
            found.extend(page);

            if next == 0 {
                return Ok(found);
            }
            cursor = next;
        }
    }
}

/// Drop credentials from a URL before it reaches the logs
fn redact(url: &str) -> &str {
    url.rsplit('@').next().unwrap_or(url)
}
