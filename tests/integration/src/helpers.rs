//! Test helpers for integration tests
//!
//! [`TestHarness`] owns one in-process backend and a clock anchored to the
//! tokio timer, so `start_paused` tests move wall time and timers together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duochat_cache::MemoryBackend;
use duochat_common::{AppConfig, RedisConfig};
use duochat_core::{Clock, TokioClock, UserId};
use duochat_service::SessionContext;
use tokio::time::Instant;

/// Shared backend and clock for a scenario
pub struct TestHarness {
    pub backend: Arc<MemoryBackend>,
    pub clock: TokioClock,
    config: AppConfig,
}

impl TestHarness {
    /// Harness with default timings, wall clock anchored at `origin`
    pub fn start(origin: DateTime<Utc>) -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            clock: TokioClock::anchored_at(origin),
            config: test_config(),
        }
    }

    /// Context for a signed-in user
    pub fn session(&self, user_id: UserId) -> SessionContext {
        SessionContext::builder(self.backend.clone())
            .self_id(user_id)
            .clock(Arc::new(self.clock))
            .app_config(&self.config)
            .build()
    }

    /// Context without an identity
    pub fn anonymous(&self) -> SessionContext {
        SessionContext::builder(self.backend.clone())
            .clock(Arc::new(self.clock))
            .app_config(&self.config)
            .build()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Default configuration, unaffected by the test environment
pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|_| None).unwrap_or_else(|e| panic!("default config rejected: {e}"))
}

/// Sleep on the tokio clock
pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Sleep until `ms` milliseconds after `started`
pub async fn advance_to(started: Instant, ms: u64) {
    tokio::time::sleep_until(started + Duration::from_millis(ms)).await;
}

/// Let spawned tasks observe the latest writes
pub async fn settle() {
    sleep_ms(1).await;
}

/// Redis settings for backend tests, or `None` to skip them
pub fn redis_test_config() -> Option<RedisConfig> {
    dotenvy::dotenv().ok();

    match std::env::var("REDIS_URL") {
        Ok(url) if !url.trim().is_empty() => Some(RedisConfig {
            url,
            max_connections: 4,
        }),
        _ => {
            eprintln!("Skipping test: REDIS_URL not set");
            None
        }
    }
}
