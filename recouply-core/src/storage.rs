use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source address recorded when the caller cannot supply one.
pub const UNKNOWN_SOURCE_ADDRESS: &str = "unknown";

/// A single persisted login attempt.
///
/// Attempts are append-only: once written they are never updated or deleted
/// by the login guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,
    pub identifier: String,
    pub source_address: String,
    pub succeeded: bool,
    pub occurred_at: DateTime<Utc>,
    /// Set only on the attempt that tripped the lockout threshold.
    pub locked_until: Option<DateTime<Utc>>,
}

/// An attempt that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginAttempt {
    pub identifier: String,
    pub source_address: String,
    pub succeeded: bool,
    pub occurred_at: DateTime<Utc>,
}

/// The grouping key the evaluator counts attempts under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptKey {
    Identifier(String),
    SourceAddress(String),
    Composite {
        identifier: String,
        source_address: String,
    },
}

impl AttemptKey {
    pub fn matches(&self, identifier: &str, source_address: &str) -> bool {
        match self {
            AttemptKey::Identifier(id) => id == identifier,
            AttemptKey::SourceAddress(addr) => addr == source_address,
            AttemptKey::Composite {
                identifier: id,
                source_address: addr,
            } => id == identifier && addr == source_address,
        }
    }
}

/// Statistics derived from the attempt log for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptStats {
    /// Failures inside the window since the most recent success.
    pub failed_streak: u32,
    /// Latest lock expiry stamped on any attempt of the key.
    pub locked_until: Option<DateTime<Utc>>,
}

impl AttemptStats {
    /// The lock expiry if it is still in the future at `now`.
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }
}

/// Result of an atomic evaluate-then-append against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The attempt was written; `prior` are the statistics read before writing.
    Recorded {
        attempt: LoginAttempt,
        prior: AttemptStats,
    },
    /// The key was locked, nothing was written.
    Rejected { locked_until: DateTime<Utc> },
}

/// Lock state of a key as seen by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    pub identifier: String,
    pub failed_attempts: u32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    pub fn unlocked(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            failed_attempts: 0,
            is_locked: false,
            locked_until: None,
        }
    }

    pub fn from_stats(identifier: &str, stats: &AttemptStats, now: DateTime<Utc>) -> Self {
        let locked_until = stats.active_lock(now);
        Self {
            identifier: identifier.to_string(),
            failed_attempts: stats.failed_streak,
            is_locked: locked_until.is_some(),
            locked_until,
        }
    }

    /// Seconds until the lock expires, rounded up, or `None` when unlocked.
    pub fn retry_after_seconds(&self) -> Option<i64> {
        self.retry_after_seconds_at(Utc::now())
    }

    pub fn retry_after_seconds_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.locked_until
            .filter(|_| self.is_locked)
            .map(|until| retry_after_seconds(until, now))
    }
}

/// Whole seconds from `now` until `until`, rounded up and never negative.
pub fn retry_after_seconds(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (until - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}

/// Outcome reported to the caller after recording an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub locked: bool,
    pub attempts_remaining: u32,
    pub will_lock: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_active_lock_is_strictly_future() {
        let now = Utc::now();
        let stats = AttemptStats {
            failed_streak: 5,
            locked_until: Some(now),
        };
        assert!(stats.active_lock(now).is_none());
        assert_eq!(
            stats.active_lock(now - Duration::seconds(1)),
            Some(now)
        );
    }

    #[test]
    fn test_status_hides_expired_lock() {
        let now = Utc::now();
        let stats = AttemptStats {
            failed_streak: 0,
            locked_until: Some(now - Duration::minutes(1)),
        };
        let status = LockoutStatus::from_stats("a@x.com", &stats, now);
        assert!(!status.is_locked);
        assert!(status.locked_until.is_none());
        assert!(status.retry_after_seconds_at(now).is_none());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        assert_eq!(retry_after_seconds(now + Duration::milliseconds(1500), now), 2);
        assert_eq!(retry_after_seconds(now + Duration::minutes(15), now), 900);
        assert_eq!(retry_after_seconds(now - Duration::seconds(5), now), 0);
    }

    #[test]
    fn test_key_matching() {
        let key = AttemptKey::Composite {
            identifier: "a@x.com".into(),
            source_address: "10.0.0.1".into(),
        };
        assert!(key.matches("a@x.com", "10.0.0.1"));
        assert!(!key.matches("a@x.com", "10.0.0.2"));
        assert!(AttemptKey::SourceAddress("10.0.0.1".into()).matches("b@x.com", "10.0.0.1"));
        assert!(!AttemptKey::Identifier("a@x.com".into()).matches("b@x.com", "10.0.0.1"));
    }
}
