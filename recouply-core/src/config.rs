//! Lockout configuration.
//!
//! [`LockoutConfig`] carries every knob of the login guard. The pure decision
//! rules (threshold, lock expiry, remaining attempts) live on [`LockoutPolicy`],
//! which storage backends receive so they can apply them inside their own
//! atomic unit.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    storage::{AttemptKey, AttemptStats},
};

/// Longest accepted lockout duration or counting window.
pub const MAX_CONFIG_DURATION: Duration = Duration::days(365);

/// Which attempts are grouped together when counting failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Lock the account identifier (email) regardless of origin.
    #[default]
    Identifier,
    /// Lock a network source regardless of which account it targets.
    SourceAddress,
    /// Lock an identifier only for the source the failures came from.
    Composite,
}

impl KeyStrategy {
    pub fn key_for(&self, identifier: &str, source_address: &str) -> AttemptKey {
        match self {
            KeyStrategy::Identifier => AttemptKey::Identifier(identifier.to_string()),
            KeyStrategy::SourceAddress => AttemptKey::SourceAddress(source_address.to_string()),
            KeyStrategy::Composite => AttemptKey::Composite {
                identifier: identifier.to_string(),
                source_address: source_address.to_string(),
            },
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Identifier => write!(f, "identifier"),
            KeyStrategy::SourceAddress => write!(f, "source_address"),
            KeyStrategy::Composite => write!(f, "composite"),
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identifier" | "email" => Ok(KeyStrategy::Identifier),
            "source_address" | "source-address" | "ip" => Ok(KeyStrategy::SourceAddress),
            "composite" => Ok(KeyStrategy::Composite),
            other => Err(ConfigError::Invalid(format!("unknown key strategy: {other}"))),
        }
    }
}

/// Behavior of the evaluator when the attempt store cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Surface the store error; callers must deny the login.
    #[default]
    Closed,
    /// Log the store error and report the key as unlocked.
    Open,
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailMode::Closed => write!(f, "closed"),
            FailMode::Open => write!(f, "open"),
        }
    }
}

impl FromStr for FailMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(FailMode::Closed),
            "open" => Ok(FailMode::Open),
            other => Err(ConfigError::Invalid(format!("unknown fail mode: {other}"))),
        }
    }
}

/// Configuration for the login guard.
///
/// Defaults: enabled, 5 failed attempts, 15 minute lockout, 15 minute counting
/// window, keyed by identifier, failing closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutConfig {
    pub enabled: bool,
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    pub attempt_window: Duration,
    pub key_strategy: KeyStrategy,
    pub fail_mode: FailMode,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
            attempt_window: Duration::minutes(15),
            key_strategy: KeyStrategy::default(),
            fail_mode: FailMode::default(),
        }
    }
}

impl LockoutConfig {
    /// A configuration that records nothing and never locks.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_failed_attempts must be at least 1".to_string(),
            ));
        }
        if self.lockout_duration <= Duration::zero() {
            return Err(ConfigError::Invalid(
                "lockout_duration must be positive".to_string(),
            ));
        }
        if self.attempt_window <= Duration::zero() {
            return Err(ConfigError::Invalid(
                "attempt_window must be positive".to_string(),
            ));
        }
        if self.lockout_duration > MAX_CONFIG_DURATION {
            return Err(ConfigError::Invalid(
                "lockout_duration must be at most 365 days".to_string(),
            ));
        }
        if self.attempt_window > MAX_CONFIG_DURATION {
            return Err(ConfigError::Invalid(
                "attempt_window must be at most 365 days".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_failed_attempts: self.max_failed_attempts,
            lockout_duration: self.lockout_duration,
            attempt_window: self.attempt_window,
            key_strategy: self.key_strategy,
        }
    }
}

/// The decision rules applied to attempt statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    pub attempt_window: Duration,
    pub key_strategy: KeyStrategy,
}

impl LockoutPolicy {
    /// Exclusive lower bound on `occurred_at` for failures that still count
    /// towards the streak. A failure exactly one window old no longer counts.
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
        now.checked_sub_signed(self.attempt_window)
            .ok_or_else(|| ConfigError::Invalid("attempt_window out of range".to_string()))
    }

    /// Number of prior failures after which the next failure stamps a lock.
    pub fn trip_threshold(&self) -> u32 {
        self.max_failed_attempts.saturating_sub(1)
    }

    /// Lock expiry to stamp on a new attempt, given the statistics read just before it.
    pub fn lock_expiry(
        &self,
        prior: &AttemptStats,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ConfigError> {
        if succeeded || prior.failed_streak < self.trip_threshold() {
            return Ok(None);
        }

        now.checked_add_signed(self.lockout_duration)
            .map(Some)
            .ok_or_else(|| ConfigError::Invalid("lockout_duration out of range".to_string()))
    }

    /// Failures still allowed before the one that locks, counting the attempt
    /// just recorded. A success ends the streak, so it reports the full allowance.
    pub fn attempts_remaining(&self, prior: &AttemptStats, succeeded: bool) -> u32 {
        let streak = if succeeded {
            0
        } else {
            prior.failed_streak.saturating_add(1)
        };
        self.trip_threshold().saturating_sub(streak)
    }
}
