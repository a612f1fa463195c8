//! Liveness signal - one user's last-known-active instant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LivenessError, LivenessResult};
use crate::value_objects::UserId;

/// Parse a backend timestamp (RFC 3339, any offset) into UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A timestamped proof of activity for one identity.
///
/// Only the newest `observed_at` per subject is meaningful; signals are
/// never deleted, staleness comes from elapsed time alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessSignal {
    pub subject_id: UserId,
    pub observed_at: DateTime<Utc>,
}

impl LivenessSignal {
    /// Create a new signal
    pub fn new(subject_id: UserId, observed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id,
            observed_at,
        }
    }

    /// Whether this signal replaces `other` (same subject, strictly newer)
    pub fn supersedes(&self, other: &Self) -> bool {
        self.subject_id == other.subject_id && self.observed_at > other.observed_at
    }

    /// Last-write-wins merge: keep whichever of the two is newer
    pub fn latest(current: Option<Self>, incoming: Self) -> Self {
        match current {
            Some(current) if !incoming.supersedes(&current) => current,
            _ => incoming,
        }
    }

    /// Elapsed time since the signal, clamped at zero for skewed clocks
    pub fn elapsed(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.observed_at).to_std().unwrap_or_default()
    }
}

/// A liveness row as delivered by the backend; the timestamp is untrusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLiveness {
    pub subject_id: UserId,
    pub last_seen: Option<String>,
}

impl RawLiveness {
    /// Create a raw row
    pub fn new(subject_id: UserId, last_seen: Option<String>) -> Self {
        Self {
            subject_id,
            last_seen,
        }
    }

    /// Raw row for a well-formed signal
    pub fn from_signal(signal: &LivenessSignal) -> Self {
        Self::new(signal.subject_id, Some(signal.observed_at.to_rfc3339()))
    }

    /// Validate into a signal
    pub fn parse(&self) -> LivenessResult<LivenessSignal> {
        let raw = self
            .last_seen
            .as_deref()
            .ok_or_else(|| LivenessError::malformed(self.subject_id, "missing last_seen"))?;

        parse_timestamp(raw)
            .map(|at| LivenessSignal::new(self.subject_id, at))
            .ok_or_else(|| LivenessError::malformed(self.subject_id, format!("unparseable last_seen {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_parse_timestamp_offsets() {
        let parsed = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed, at(0));

        let parsed = parse_timestamp("2024-05-01T10:00:00.250000+00:00").unwrap();
        assert_eq!(parsed, at(0) + Duration::milliseconds(250));

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_latest_is_last_write_wins() {
        let user = UserId::generate();
        let older = LivenessSignal::new(user, at(0));
        let newer = LivenessSignal::new(user, at(30));

        assert_eq!(LivenessSignal::latest(None, older), older);
        assert_eq!(LivenessSignal::latest(Some(older), newer), newer);
        // Late delivery of an old signal does not roll back
        assert_eq!(LivenessSignal::latest(Some(newer), older), newer);
        assert!(!older.supersedes(&older));
    }

    #[test]
    fn test_elapsed_clamps_future() {
        let signal = LivenessSignal::new(UserId::generate(), at(10));
        assert_eq!(signal.elapsed(at(70)), std::time::Duration::from_secs(60));
        assert_eq!(signal.elapsed(at(0)), std::time::Duration::ZERO);
    }

    #[test]
    fn test_raw_parse() {
        let user = UserId::generate();
        let signal = LivenessSignal::new(user, at(5));
        assert_eq!(RawLiveness::from_signal(&signal).parse().unwrap(), signal);

        let missing = RawLiveness::new(user, None);
        assert!(matches!(
            missing.parse(),
            Err(LivenessError::MalformedSignal { .. })
        ));

        let garbage = RawLiveness::new(user, Some("12:00".to_string()));
        assert_eq!(garbage.parse().unwrap_err().code(), "MALFORMED_SIGNAL");
    }
}
