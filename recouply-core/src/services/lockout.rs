//! Login rate limiting and account lockout.
//!
//! This module implements the evaluator and recorder of the login guard on top
//! of an append-only attempt log.
//!
//! # Features
//!
//! - Per-key failure streaks (identifier, source address or both)
//! - Automatic lockout on the threshold-tripping failure
//! - Time-based unlock with no stored "unlocked" event
//! - A successful attempt ends the failure streak
//! - Configurable fail-closed / fail-open evaluation
//! - Security events for failures, lockouts and successes
//!
//! # Example
//!
//! ```rust,ignore
//! use recouply_core::services::LockoutService;
//! use recouply_core::LockoutConfig;
//!
//! let service = LockoutService::new(repository, LockoutConfig::default());
//!
//! // Before checking credentials
//! if service.is_locked("user@example.com", Some("192.168.1.1")).await? {
//!     // Reject without touching the credentials
//! }
//!
//! // After checking credentials
//! let outcome = service
//!     .record_attempt("user@example.com", Some("192.168.1.1"), false)
//!     .await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    Error,
    config::{FailMode, LockoutConfig},
    error::LockoutError,
    events::{Event, EventBus},
    repositories::LoginAttemptRepository,
    storage::{AppendOutcome, LockoutStatus, LoginAttempt, NewLoginAttempt, RecordOutcome},
    validation::{normalize_identifier, normalize_source_address},
};

/// Service for evaluating and recording login attempts.
///
/// # Thread Safety
///
/// The service is shared across request handlers behind an `Arc`. It holds no
/// per-key state of its own; atomicity of evaluate-then-append is delegated to
/// [`LoginAttemptRepository::append_attempt`].
pub struct LockoutService<R: LoginAttemptRepository> {
    repository: Arc<R>,
    config: LockoutConfig,
    event_bus: EventBus,
}

impl<R: LoginAttemptRepository> LockoutService<R> {
    /// Create a new LockoutService.
    ///
    /// # Arguments
    ///
    /// * `repository` - The attempt log implementation
    /// * `config` - Configuration for lockout behavior
    pub fn new(repository: Arc<R>, config: LockoutConfig) -> Self {
        Self {
            repository,
            config,
            event_bus: EventBus::default(),
        }
    }

    /// Replace the event bus security events are emitted on.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Get the current lockout status for an identifier.
    ///
    /// Read-only. With [`FailMode::Open`] a store failure is logged and an
    /// unlocked status is returned instead of the error.
    pub async fn get_lockout_status(
        &self,
        identifier: &str,
        source_address: Option<&str>,
    ) -> Result<LockoutStatus, Error> {
        self.get_lockout_status_at(identifier, source_address, Utc::now())
            .await
    }

    /// Get the lockout status as of `now`.
    pub async fn get_lockout_status_at(
        &self,
        identifier: &str,
        source_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LockoutStatus, Error> {
        let identifier = normalize_identifier(identifier)?;

        if !self.config.enabled {
            return Ok(LockoutStatus::unlocked(&identifier));
        }

        let source_address = normalize_source_address(source_address);
        let policy = self.config.policy();
        let key = policy.key_strategy.key_for(&identifier, &source_address);
        let since = policy.window_start(now)?;

        match self.repository.get_attempt_stats(&key, since).await
        {
            Ok(stats) => Ok(LockoutStatus::from_stats(&identifier, &stats, now)),
            Err(e) if self.config.fail_mode == FailMode::Open => {
                tracing::warn!(
                    error = %e,
                    identifier = %identifier,
                    "Attempt store unreadable, failing open"
                );
                Ok(LockoutStatus::unlocked(&identifier))
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    identifier = %identifier,
                    "Attempt store unreadable, failing closed"
                );
                Err(e)
            }
        }
    }

    /// Check if an identifier is currently locked (convenience method).
    pub async fn is_locked(
        &self,
        identifier: &str,
        source_address: Option<&str>,
    ) -> Result<bool, Error> {
        Ok(self
            .get_lockout_status(identifier, source_address)
            .await?
            .is_locked)
    }

    /// Record the outcome of one login attempt.
    ///
    /// Returns [`LockoutError::AccountLocked`] without writing anything when
    /// the key is already locked. Store failures always propagate.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The identifier that was attempted (may or may not exist)
    /// * `source_address` - Optional network address of the client
    /// * `succeeded` - Whether the caller's credential check passed
    pub async fn record_attempt(
        &self,
        identifier: &str,
        source_address: Option<&str>,
        succeeded: bool,
    ) -> Result<RecordOutcome, Error> {
        self.record_attempt_at(identifier, source_address, succeeded, Utc::now())
            .await
    }

    /// Record an attempt that occurred at `now`.
    pub async fn record_attempt_at(
        &self,
        identifier: &str,
        source_address: Option<&str>,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, Error> {
        let identifier = normalize_identifier(identifier)?;
        let policy = self.config.policy();

        // Disabled protection records nothing
        if !self.config.enabled {
            return Ok(RecordOutcome {
                locked: false,
                attempts_remaining: policy.trip_threshold(),
                will_lock: false,
            });
        }

        let attempt = NewLoginAttempt {
            identifier,
            source_address: normalize_source_address(source_address),
            succeeded,
            occurred_at: now,
        };

        let (attempt, prior) = match self.repository.append_attempt(attempt, &policy).await? {
            AppendOutcome::Recorded { attempt, prior } => (attempt, prior),
            AppendOutcome::Rejected { locked_until } => {
                tracing::info!(
                    locked_until = %locked_until,
                    "Rejected login attempt for locked key"
                );
                return Err(LockoutError::AccountLocked { locked_until }.into());
            }
        };

        self.emit(&event_for(&attempt, prior.failed_streak)).await;

        Ok(RecordOutcome {
            locked: false,
            attempts_remaining: policy.attempts_remaining(&prior, attempt.succeeded),
            will_lock: attempt.locked_until.is_some(),
        })
    }

    /// Most recent attempts for an identifier, newest first.
    pub async fn recent_attempts(
        &self,
        identifier: &str,
        limit: u32,
    ) -> Result<Vec<LoginAttempt>, Error> {
        let identifier = normalize_identifier(identifier)?;
        self.repository.list_attempts(&identifier, limit).await
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.repository.health_check().await
    }

    // Handler failures never undo a durable record
    async fn emit(&self, event: &Event) {
        if let Err(e) = self.event_bus.emit(event).await {
            tracing::warn!(error = %e, "Failed to deliver login attempt event");
        }
    }
}

fn event_for(attempt: &LoginAttempt, prior_streak: u32) -> Event {
    if attempt.succeeded {
        return Event::LoginSucceeded {
            identifier: attempt.identifier.clone(),
            source_address: attempt.source_address.clone(),
            timestamp: attempt.occurred_at,
        };
    }

    match attempt.locked_until {
        Some(locked_until) => {
            tracing::warn!(
                identifier = %attempt.identifier,
                source_address = %attempt.source_address,
                locked_until = %locked_until,
                "Account locked after repeated failed logins"
            );
            Event::AccountLocked {
                identifier: attempt.identifier.clone(),
                failed_attempts: prior_streak + 1,
                locked_until,
                source_address: attempt.source_address.clone(),
                timestamp: attempt.occurred_at,
            }
        }
        None => Event::LoginFailed {
            identifier: attempt.identifier.clone(),
            failed_attempts: prior_streak + 1,
            source_address: attempt.source_address.clone(),
            timestamp: attempt.occurred_at,
        },
    }
}
