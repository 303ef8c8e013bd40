//! Builder pattern for constructing [`LoginGuard`] instances
//!
//! This module provides a type-safe builder for creating [`LoginGuard`]
//! instances with compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use recouply::LoginGuardBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build with SQLite and auto-migration
//!     let guard = LoginGuardBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     // Or build without auto-migration and run manually
//!     let guard = LoginGuardBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .build()
//!         .await?;
//!     guard.migrate().await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use recouply_core::{EventBus, LockoutConfig, LockoutService};
use recouply_storage_sqlite::SqliteStorage;

use crate::{
    LoginGuard,
    store::{AttemptStore, MemoryAttemptStore, SqliteAttemptStore},
};

/// Errors that can occur when building a [`LoginGuard`].
#[derive(Debug, thiserror::Error)]
pub enum LoginGuardBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`LoginGuardBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<S: AttemptStore> {
    store: Arc<S>,
}

/// A type-safe builder for constructing [`LoginGuard`] instances.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<S>`]: Storage configured, ready to build
pub struct LoginGuardBuilder<Storage> {
    storage: Storage,
    lockout_config: LockoutConfig,
    event_bus: Option<EventBus>,
    apply_migrations: bool,
}

impl Default for LoginGuardBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginGuardBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Lockout: enabled, 5 failures lock for 15 minutes, keyed by identifier
    /// - Fail mode: closed
    /// - Apply migrations: false
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            lockout_config: LockoutConfig::default(),
            event_bus: None,
            apply_migrations: false,
        }
    }

    fn with_store<S: AttemptStore>(self, store: S) -> LoginGuardBuilder<WithStorage<S>> {
        LoginGuardBuilder {
            storage: WithStorage {
                store: Arc::new(store),
            },
            lockout_config: self.lockout_config,
            event_bus: self.event_bus,
            apply_migrations: self.apply_migrations,
        }
    }

    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<LoginGuardBuilder<WithStorage<SqliteAttemptStore>>, LoginGuardBuilderError> {
        let storage = SqliteStorage::connect(url)
            .await
            .map_err(|e| LoginGuardBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_store(SqliteAttemptStore::new(storage)))
    }

    /// Configure SQLite storage with an existing connection pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> LoginGuardBuilder<WithStorage<SqliteAttemptStore>> {
        self.with_store(SqliteAttemptStore::new(SqliteStorage::new(pool)))
    }

    /// Configure the process-local attempt store.
    pub fn with_memory(self) -> LoginGuardBuilder<WithStorage<MemoryAttemptStore>> {
        self.with_store(MemoryAttemptStore::new())
    }
}

impl<Storage> LoginGuardBuilder<Storage> {
    /// Set the lockout configuration. It is validated by `build()`.
    pub fn with_lockout_config(mut self, config: LockoutConfig) -> Self {
        self.lockout_config = config;
        self
    }

    /// Emit security events on the given bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Whether `build()` applies pending migrations.
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }
}

impl<S: AttemptStore> LoginGuardBuilder<WithStorage<S>> {
    /// Build the [`LoginGuard`] instance.
    ///
    /// Validates the lockout configuration and, when requested, applies
    /// migrations before returning.
    pub async fn build(self) -> Result<LoginGuard<S>, LoginGuardBuilderError> {
        self.lockout_config
            .validate()
            .map_err(|e| LoginGuardBuilderError::InvalidConfiguration(e.to_string()))?;

        let store = self.storage.store;

        if self.apply_migrations {
            store
                .migrate()
                .await
                .map_err(|e| LoginGuardBuilderError::Migration(e.to_string()))?;
        }

        let mut service = LockoutService::new(store.repository(), self.lockout_config);
        if let Some(event_bus) = self.event_bus {
            service = service.with_event_bus(event_bus);
        }

        tracing::debug!(
            enabled = service.is_enabled(),
            max_failed_attempts = service.config().max_failed_attempts,
            key_strategy = %service.config().key_strategy,
            fail_mode = %service.config().fail_mode,
            "Login guard built"
        );

        Ok(LoginGuard::new(store, Arc::new(service)))
    }
}
