//! Presence evaluation
//!
//! Classifies a last-seen instant against the clock. Nothing is cached:
//! the same input yields "Online" now and "1m ago" a minute later.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use duochat_common::PresenceConfig;
use duochat_core::{Clock, UserId};
use serde::Serialize;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Fallback when the configured date pattern cannot be rendered
const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

/// Tri-state liveness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Seen within the online window
    Online,
    /// Seen before, but not recently
    RecentlyActive,
    /// Never seen (or only malformed signals)
    Offline,
}

impl Liveness {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::RecentlyActive => "recently_active",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a UI shows for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceView {
    pub is_online: bool,
    pub label: String,
    pub liveness: Liveness,
}

impl PresenceView {
    /// View of a user never observed
    #[must_use]
    pub fn offline() -> Self {
        Self {
            is_online: false,
            label: "Offline".to_string(),
            liveness: Liveness::Offline,
        }
    }
}

/// One row of a user list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub last_seen: Option<DateTime<Utc>>,
    pub view: PresenceView,
}

/// Presence evaluator
#[derive(Debug, Clone)]
pub struct PresenceEvaluator {
    clock: Arc<dyn Clock>,
    online_window: Duration,
    date_format: String,
}

impl PresenceEvaluator {
    /// Create an evaluator
    pub fn new(clock: Arc<dyn Clock>, config: &PresenceConfig) -> Self {
        Self {
            clock,
            online_window: config.online_window,
            date_format: config.date_format.clone(),
        }
    }

    pub fn online_window(&self) -> Duration {
        self.online_window
    }

    /// Seen within the online window (future instants count as now)
    pub fn is_online(&self, last_seen: Option<DateTime<Utc>>) -> bool {
        self.is_online_at(last_seen, self.clock.now())
    }

    pub fn classify(&self, last_seen: Option<DateTime<Utc>>) -> Liveness {
        self.classify_at(last_seen, self.clock.now())
    }

    /// Human-readable last-seen label
    pub fn describe_last_seen(&self, last_seen: Option<DateTime<Utc>>) -> String {
        self.describe_at(last_seen, self.clock.now())
    }

    /// Classification and label from a single clock reading
    pub fn view(&self, last_seen: Option<DateTime<Utc>>) -> PresenceView {
        self.view_at(last_seen, self.clock.now())
    }

    /// Views for a set of users, most recently seen first, never-seen last
    pub fn roster<I>(&self, users: I) -> Vec<RosterEntry>
    where
        I: IntoIterator<Item = (UserId, Option<DateTime<Utc>>)>,
    {
        let now = self.clock.now();
        let mut entries: Vec<RosterEntry> = users
            .into_iter()
            .map(|(user_id, last_seen)| RosterEntry {
                user_id,
                last_seen,
                view: self.view_at(last_seen, now),
            })
            .collect();

        // None sorts below every Some; reversing puts it last
        entries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        entries
    }

    fn elapsed(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (now - last_seen).to_std().unwrap_or_default()
    }

    fn is_online_at(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_seen.is_some_and(|seen| Self::elapsed(seen, now) < self.online_window)
    }

    fn classify_at(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Liveness {
        match last_seen {
            None => Liveness::Offline,
            Some(_) if self.is_online_at(last_seen, now) => Liveness::Online,
            Some(_) => Liveness::RecentlyActive,
        }
    }

    fn view_at(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> PresenceView {
        let liveness = self.classify_at(last_seen, now);
        PresenceView {
            is_online: liveness == Liveness::Online,
            label: self.describe_at(last_seen, now),
            liveness,
        }
    }

    fn describe_at(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
        let Some(seen) = last_seen else {
            return "Offline".to_string();
        };
        if self.is_online_at(last_seen, now) {
            return "Online".to_string();
        }

        let secs = Self::elapsed(seen, now).as_secs();
        let minutes = secs / MINUTE;
        let hours = secs / HOUR;
        let days = secs / DAY;

        if minutes < 1 {
            "Just now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m ago")
        } else if hours < 24 {
            format!("{hours}h ago")
        } else if days == 1 {
            "Yesterday".to_string()
        } else if days < 7 {
            format!("{days}d ago")
        } else {
            self.local_date(seen)
        }
    }

    fn local_date(&self, seen: DateTime<Utc>) -> String {
        let local = seen.with_timezone(&Local);
        let mut out = String::new();
        if write!(out, "{}", local.format(&self.date_format)).is_err() {
            out.clear();
            let _ = write!(out, "{}", local.format(FALLBACK_DATE_FORMAT));
        }
        out
    }
}
