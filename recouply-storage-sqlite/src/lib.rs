//! SQLite attempt store for the Recouply login guard.
//!
//! The store keeps the append-only `login_attempts` log. Lock state is never
//! stored separately: it is read back from the `locked_until` column of the
//! attempt that tripped the threshold.
//!
//! ```rust,no_run
//! use recouply_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), recouply_core::Error> {
//! let storage = SqliteStorage::connect("sqlite://recouply.db?mode=rwc").await?;
//! storage.migrate().await?;
//! let repository = storage.repository();
//! # Ok(())
//! # }
//! ```
pub mod migrations;
pub mod repositories;

use std::str::FromStr;

use recouply_core::{Error, error::StorageError};
use recouply_migration::MigrationManager;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::migrations::{SqliteMigrationManager, all_migrations};

pub use repositories::SqliteLoginAttemptRepository;

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `database_url`, creating the file if needed.
    ///
    /// In-memory databases are opened with a single connection so every
    /// query sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                tracing::error!(error = %e, "Invalid SQLite database URL");
                StorageError::Connection(format!("Invalid SQLite database URL: {e}"))
            })?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite");
                StorageError::Connection("Failed to connect to SQLite".to_string())
            })?;

        tracing::debug!(max_connections, "Connected to SQLite attempt store");

        Ok(Self::new(pool))
    }

    /// Apply any pending schema migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            StorageError::Migration("Failed to initialize migrations".to_string())
        })?;

        let applied = manager.up(&all_migrations()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            StorageError::Migration("Failed to run migrations".to_string())
        })?;

        if !applied.is_empty() {
            tracing::info!(?applied, "Applied schema versions");
        }

        Ok(())
    }

    /// The schema version currently applied, if any.
    pub async fn schema_version(&self) -> Result<Option<i64>, Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            StorageError::Migration("Failed to initialize migrations".to_string())
        })?;

        let version = manager.current_version().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read schema version");
            StorageError::Migration("Failed to read schema version".to_string())
        })?;

        Ok(version)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn repository(&self) -> SqliteLoginAttemptRepository {
        SqliteLoginAttemptRepository::new(self.pool.clone())
    }
}
