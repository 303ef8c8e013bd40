//! In-process attempt log.
//!
//! Useful for tests and single-instance deployments. The whole evaluate and
//! append sequence runs under one mutex, so it is atomic within the process.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    config::LockoutPolicy,
    error::StorageError,
    repositories::LoginAttemptRepository,
    storage::{AppendOutcome, AttemptKey, AttemptStats, LoginAttempt, NewLoginAttempt},
};

#[derive(Debug, Default)]
pub struct MemoryLoginAttemptRepository {
    attempts: Mutex<Vec<LoginAttempt>>,
}

impl MemoryLoginAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attempts across all identifiers.
    pub fn len(&self) -> usize {
        self.attempts.lock().map(|a| a.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<LoginAttempt>>, Error> {
        self.attempts
            .lock()
            .map_err(|_| StorageError::Database("attempt log mutex poisoned".to_string()).into())
    }
}

fn stats_for(attempts: &[LoginAttempt], key: &AttemptKey, since: DateTime<Utc>) -> AttemptStats {
    let matching = || {
        attempts
            .iter()
            .filter(|a| key.matches(&a.identifier, &a.source_address))
    };

    let last_success = matching().filter(|a| a.succeeded).map(|a| a.id).max();
    let failed_streak = matching()
        .filter(|a| !a.succeeded && a.occurred_at > since)
        .filter(|a| last_success.is_none_or(|id| a.id > id))
        .count() as u32;

    AttemptStats {
        failed_streak,
        locked_until: matching().filter_map(|a| a.locked_until).max(),
    }
}

#[async_trait]
impl LoginAttemptRepository for MemoryLoginAttemptRepository {
    async fn get_attempt_stats(
        &self,
        key: &AttemptKey,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        let attempts = self.lock()?;
        Ok(stats_for(&attempts, key, since))
    }

    async fn append_attempt(
        &self,
        attempt: NewLoginAttempt,
        policy: &LockoutPolicy,
    ) -> Result<AppendOutcome, Error> {
        let mut attempts = self.lock()?;
        let now = attempt.occurred_at;
        let key = policy
            .key_strategy
            .key_for(&attempt.identifier, &attempt.source_address);
        let prior = stats_for(&attempts, &key, policy.window_start(now)?);

        if let Some(locked_until) = prior.active_lock(now) {
            return Ok(AppendOutcome::Rejected { locked_until });
        }

        let record = LoginAttempt {
            id: attempts.len() as i64 + 1,
            locked_until: policy.lock_expiry(&prior, attempt.succeeded, now)?,
            identifier: attempt.identifier,
            source_address: attempt.source_address,
            succeeded: attempt.succeeded,
            occurred_at: now,
        };
        attempts.push(record.clone());

        Ok(AppendOutcome::Recorded {
            attempt: record,
            prior,
        })
    }

    async fn list_attempts(
        &self,
        identifier: &str,
        limit: u32,
    ) -> Result<Vec<LoginAttempt>, Error> {
        let attempts = self.lock()?;
        Ok(attempts
            .iter()
            .rev()
            .filter(|a| a.identifier == identifier)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.lock().map(|_| ())
    }
}
