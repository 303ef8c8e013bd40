//! # Recouply
//!
//! Login rate limiting and account lockout for the Recouply platform.
//!
//! The login handler asks the guard whether an account is locked before
//! checking credentials, and reports the outcome of the check afterwards.
//! Five consecutive failures lock the account for fifteen minutes; the lock
//! lifts purely by time. Every attempt is kept in an append-only log and the
//! lock state is derived from it on each request.
//!
//! ## Storage Support
//!
//! - SQLite
//! - In-memory (single process, lost on restart)
//!
//! ## Example
//!
//! ```rust,no_run
//! use recouply::LoginGuardBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guard = LoginGuardBuilder::new()
//!         .with_sqlite("sqlite://recouply.db?mode=rwc")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let outcome = guard
//!         .service()
//!         .record_attempt("user@example.com", Some("192.0.2.1"), false)
//!         .await?;
//!     println!("{} attempts remaining", outcome.attempts_remaining);
//!
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

pub mod audit;
pub mod builder;
pub mod store;

pub use audit::AuditLogHandler;
pub use builder::{LoginGuardBuilder, LoginGuardBuilderError, NoStorage, WithStorage};
pub use store::{AttemptStore, MemoryAttemptStore, SqliteAttemptStore};

/// Re-export core types from recouply_core
pub use recouply_core::{
    Error, Event, EventBus, EventHandler, FailMode, KeyStrategy, LockoutConfig, LockoutService,
    LockoutStatus, LoginAttempt, RecordOutcome,
};

/// A configured login guard: an attempt store plus the lockout service over it.
pub struct LoginGuard<S: AttemptStore> {
    store: Arc<S>,
    service: Arc<LockoutService<S::Repository>>,
}

impl<S: AttemptStore> LoginGuard<S> {
    pub fn new(store: Arc<S>, service: Arc<LockoutService<S::Repository>>) -> Self {
        Self { store, service }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn service(&self) -> Arc<LockoutService<S::Repository>> {
        self.service.clone()
    }

    /// Apply pending migrations to the attempt store.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.store.migrate().await
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.service.health_check().await
    }

    /// Route builder for the HTTP surface, mounted at `/login-attempts` unless changed.
    pub fn routes(&self) -> recouply_axum::LoginGuardRouterBuilder<S::Repository> {
        recouply_axum::routes(self.service.clone())
    }

    /// The HTTP surface with default settings.
    pub fn router(&self) -> axum::Router {
        self.routes().build()
    }
}
