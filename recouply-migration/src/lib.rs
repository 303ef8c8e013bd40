//! Versioned schema changes for attempt stores.
//!
//! A backend lists its schema as [`Migration`]s with strictly increasing
//! versions and records progress through a [`MigrationManager`]. The manager
//! only has to apply or revert a single step atomically; walking the list and
//! skipping what is already recorded is shared here.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::Database;
use thiserror::Error;

/// Table every backend records applied versions in.
pub const MIGRATIONS_TABLE: &str = "_recouply_migrations";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration {version} does not come after {previous}")]
    OutOfOrder { version: i64, previous: i64 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    fn version(&self) -> i64;

    fn name(&self) -> &str;

    /// Runs inside the manager's transaction for this step.
    async fn apply<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    async fn revert<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix seconds
    pub applied_at: i64,
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    /// Create [`MIGRATIONS_TABLE`] if it is missing.
    async fn initialize(&self) -> Result<()>;

    /// Applied migrations, lowest version first.
    async fn applied(&self) -> Result<Vec<MigrationRecord>>;

    /// Apply one migration and record it in a single transaction.
    async fn apply_one(&self, migration: &dyn Migration<DB>) -> Result<()>;

    /// Revert one migration and drop its record in a single transaction.
    async fn revert_one(&self, migration: &dyn Migration<DB>) -> Result<()>;

    /// Apply every migration not yet recorded. Returns the versions applied.
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<Vec<i64>> {
        check_order(migrations)?;
        let applied = self.applied_versions().await?;

        let mut ran = Vec::new();
        for migration in migrations {
            if applied.contains(&migration.version()) {
                continue;
            }
            self.apply_one(migration.as_ref()).await?;
            ran.push(migration.version());
        }
        Ok(ran)
    }

    /// Revert every recorded migration, highest version first. Returns the
    /// versions reverted.
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<Vec<i64>> {
        check_order(migrations)?;
        let applied = self.applied_versions().await?;

        let mut ran = Vec::new();
        for migration in migrations.iter().rev() {
            if !applied.contains(&migration.version()) {
                continue;
            }
            self.revert_one(migration.as_ref()).await?;
            ran.push(migration.version());
        }
        Ok(ran)
    }

    async fn applied_versions(&self) -> Result<BTreeSet<i64>> {
        Ok(self
            .applied()
            .await?
            .into_iter()
            .map(|record| record.version)
            .collect())
    }

    /// Highest applied version, or `None` on a fresh database.
    async fn current_version(&self) -> Result<Option<i64>> {
        Ok(self.applied_versions().await?.last().copied())
    }
}

/// Fails unless versions increase strictly along the list.
pub fn check_order<DB: Database>(migrations: &[Box<dyn Migration<DB>>]) -> Result<()> {
    for pair in migrations.windows(2) {
        let (previous, version) = (pair[0].version(), pair[1].version());
        if version <= previous {
            return Err(MigrationError::OutOfOrder { version, previous });
        }
    }
    Ok(())
}
