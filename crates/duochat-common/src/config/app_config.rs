//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present). Every value has a default; only malformed values are errors.

use chrono::format::{Item, StrftimeItems};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub presence: PresenceConfig,
    pub typing: TypingConfig,
    /// Redis backend; `None` selects the in-process backend
    pub redis: Option<RedisConfig>,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(format!("unknown environment {s:?}")),
        }
    }
}

/// Presence classification and heartbeat settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceConfig {
    /// A signal younger than this means "online"
    pub online_window: Duration,
    /// Period of the self-heartbeat
    pub heartbeat_interval: Duration,
    /// How often watched presence is re-evaluated without new signals
    pub refresh_interval: Duration,
    /// `strftime` pattern for last-seen dates a week or more old
    pub date_format: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_window: default_online_window(),
            heartbeat_interval: default_heartbeat_interval(),
            refresh_interval: default_presence_refresh(),
            date_format: default_date_format(),
        }
    }
}

impl PresenceConfig {
    /// Check the cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.online_window {
            return Err(ConfigError::InvalidValue(
                "PRESENCE_HEARTBEAT_INTERVAL_SECS",
                "must be non-zero and shorter than the online window".to_string(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PRESENCE_REFRESH_INTERVAL_SECS",
                "must be non-zero".to_string(),
            ));
        }
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidValue(
                "PRESENCE_DATE_FORMAT",
                self.date_format.clone(),
            ));
        }
        Ok(())
    }
}

/// Typing indicator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingConfig {
    /// Quiet period after the last keystroke before the announcement is retracted
    pub quiet_period: Duration,
    /// Minimum gap between re-publishes while typing continues
    pub refresh_interval: Duration,
    /// Receive-side bound after which an unretracted announcement is ignored
    pub stale_after: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            quiet_period: default_quiet_period(),
            refresh_interval: default_typing_refresh(),
            stale_after: default_stale_after(),
        }
    }
}

impl TypingConfig {
    /// Check the cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quiet_period.is_zero() {
            return Err(ConfigError::InvalidValue(
                "TYPING_QUIET_PERIOD_MS",
                "must be non-zero".to_string(),
            ));
        }
        if self.refresh_interval >= self.stale_after {
            return Err(ConfigError::InvalidValue(
                "TYPING_REFRESH_INTERVAL_MS",
                "must be shorter than TYPING_STALE_AFTER_MS".to_string(),
            ));
        }
        Ok(())
    }
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
}

// Default value functions
fn default_app_name() -> String {
    "duochat".to_string()
}

fn default_online_window() -> Duration {
    Duration::from_secs(60)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_presence_refresh() -> Duration {
    Duration::from_secs(10)
}

fn default_date_format() -> String {
    "%-m/%-d/%Y".to_string()
}

fn default_quiet_period() -> Duration {
    Duration::from_millis(2000)
}

fn default_typing_refresh() -> Duration {
    Duration::from_millis(3000)
}

fn default_stale_after() -> Duration {
    Duration::from_millis(10_000) // matches the Redis typing key TTL
}

fn default_redis_max_connections() -> u32 {
    10
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let config = Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: vars.parse("APP_ENV")?.unwrap_or_default(),
            },
            presence: PresenceConfig {
                online_window: vars
                    .seconds("PRESENCE_ONLINE_WINDOW_SECS")?
                    .unwrap_or_else(default_online_window),
                heartbeat_interval: vars
                    .seconds("PRESENCE_HEARTBEAT_INTERVAL_SECS")?
                    .unwrap_or_else(default_heartbeat_interval),
                refresh_interval: vars
                    .seconds("PRESENCE_REFRESH_INTERVAL_SECS")?
                    .unwrap_or_else(default_presence_refresh),
                date_format: lookup("PRESENCE_DATE_FORMAT").unwrap_or_else(default_date_format),
            },
            typing: TypingConfig {
                quiet_period: vars
                    .millis("TYPING_QUIET_PERIOD_MS")?
                    .unwrap_or_else(default_quiet_period),
                refresh_interval: vars
                    .millis("TYPING_REFRESH_INTERVAL_MS")?
                    .unwrap_or_else(default_typing_refresh),
                stale_after: vars
                    .millis("TYPING_STALE_AFTER_MS")?
                    .unwrap_or_else(default_stale_after),
            },
            redis: match lookup("REDIS_URL").filter(|url| !url.trim().is_empty()) {
                Some(url) => Some(RedisConfig {
                    url,
                    max_connections: vars
                        .parse("REDIS_MAX_CONNECTIONS")?
                        .unwrap_or_else(default_redis_max_connections),
                }),
                None => None,
            },
        };

        config.presence.validate()?;
        config.typing.validate()?;
        Ok(config)
    }
}

/// Typed access to an optional variable
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError> {
        match (self.0)(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue(name, raw)),
            None => Ok(None),
        }
    }

    fn seconds(&self, name: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_secs))
    }

    fn millis(&self, name: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
