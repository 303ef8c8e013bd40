//! Repository trait for the login attempt log.
//!
//! This module defines the storage interface the lockout service uses to read
//! attempt history and append new attempts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    config::LockoutPolicy,
    storage::{AppendOutcome, AttemptKey, AttemptStats, LoginAttempt, NewLoginAttempt},
};

/// Repository for login attempt records.
///
/// Implementations store an append-only log of attempts. Lock state is never
/// stored separately; it is derived from the log on every read.
///
/// # Security Considerations
///
/// - Attempts must be recorded for every identifier, including ones that have
///   no account, so the log cannot be used for user enumeration.
/// - [`append_attempt`](Self::append_attempt) must evaluate and write in one
///   atomic unit. Two concurrent failures for the same key must never both
///   observe the pre-lock streak.
/// - Source addresses stored for auditing may be subject to data retention
///   regulations.
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync + 'static {
    /// Get attempt statistics for a key.
    ///
    /// `failed_streak` counts failures with `occurred_at > since` that were
    /// written after the key's most recent success. `locked_until` is the
    /// latest lock expiry stamped on any attempt of the key.
    async fn get_attempt_stats(
        &self,
        key: &AttemptKey,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error>;

    /// Evaluate the key of `attempt` and append it, atomically.
    ///
    /// If the key is locked at `attempt.occurred_at`, nothing is written and
    /// [`AppendOutcome::Rejected`] is returned. Otherwise the attempt is stored
    /// with the lock expiry computed by [`LockoutPolicy::lock_expiry`] from the
    /// statistics read inside the same unit.
    async fn append_attempt(
        &self,
        attempt: NewLoginAttempt,
        policy: &LockoutPolicy,
    ) -> Result<AppendOutcome, Error>;

    /// Most recent attempts for an identifier, newest first.
    async fn list_attempts(&self, identifier: &str, limit: u32)
    -> Result<Vec<LoginAttempt>, Error>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> Result<(), Error>;
}
