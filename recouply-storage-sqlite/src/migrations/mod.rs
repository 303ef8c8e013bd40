//! Schema of the SQLite attempt store.
//!
//! Each version is a list of SQL statements; [`SqliteMigrationManager`] runs
//! one version per transaction and records it in [`MIGRATIONS_TABLE`].

use async_trait::async_trait;
use chrono::Utc;
use recouply_migration::{
    MIGRATIONS_TABLE, Migration, MigrationError, MigrationManager, MigrationRecord,
};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationManager<Sqlite> for SqliteMigrationManager {
    async fn initialize(&self) -> Result<(), MigrationError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )"#
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = sqlx::query_as::<_, MigrationRecord>(&format!(
            "SELECT version, name, applied_at FROM {MIGRATIONS_TABLE} ORDER BY version"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn apply_one(&self, migration: &dyn Migration<Sqlite>) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;
        tracing::info!(
            version = migration.version(),
            name = migration.name(),
            "Applying schema version"
        );

        migration.apply(&mut tx).await?;
        sqlx::query(&format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at) VALUES (?, ?, ?)"
        ))
        .bind(migration.version())
        .bind(migration.name())
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn revert_one(&self, migration: &dyn Migration<Sqlite>) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;
        tracing::warn!(
            version = migration.version(),
            name = migration.name(),
            "Reverting schema version"
        );

        migration.revert(&mut tx).await?;
        sqlx::query(&format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?"))
            .bind(migration.version())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// A schema version expressed as SQL statements run in order.
pub struct SchemaChange {
    pub version: i64,
    pub name: &'static str,
    pub apply: &'static [&'static str],
    pub revert: &'static [&'static str],
}

async fn run_statements(
    conn: &mut SqliteConnection,
    statements: &[&str],
) -> Result<(), MigrationError> {
    for statement in statements {
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl Migration<Sqlite> for SchemaChange {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        self.name
    }

    async fn apply<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        run_statements(conn, self.apply).await
    }

    async fn revert<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        run_statements(conn, self.revert).await
    }
}

// Timestamps are unix milliseconds
const LOGIN_ATTEMPTS: SchemaChange = SchemaChange {
    version: 1,
    name: "create_login_attempts",
    apply: &[r#"
        CREATE TABLE IF NOT EXISTS login_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identifier TEXT NOT NULL,
            source_address TEXT NOT NULL DEFAULT 'unknown',
            succeeded INTEGER NOT NULL CHECK (succeeded IN (0, 1)),
            occurred_at INTEGER NOT NULL,
            locked_until INTEGER,
            CHECK (locked_until IS NULL OR locked_until > occurred_at)
        )"#],
    revert: &["DROP TABLE IF EXISTS login_attempts"],
};

const LOGIN_ATTEMPT_KEYS: SchemaChange = SchemaChange {
    version: 2,
    name: "index_login_attempt_keys",
    apply: &[
        "CREATE INDEX IF NOT EXISTS idx_login_attempts_identifier ON login_attempts(identifier, occurred_at)",
        "CREATE INDEX IF NOT EXISTS idx_login_attempts_source_address ON login_attempts(source_address, occurred_at)",
    ],
    revert: &[
        "DROP INDEX IF EXISTS idx_login_attempts_identifier",
        "DROP INDEX IF EXISTS idx_login_attempts_source_address",
    ],
};

/// Rejects UPDATE and DELETE on the attempt log at the database level.
const APPEND_ONLY_LOGIN_ATTEMPTS: SchemaChange = SchemaChange {
    version: 3,
    name: "append_only_login_attempts",
    apply: &[
        r#"
        CREATE TRIGGER IF NOT EXISTS login_attempts_no_update
        BEFORE UPDATE ON login_attempts
        BEGIN
            SELECT RAISE(ABORT, 'login_attempts is append-only');
        END"#,
        r#"
        CREATE TRIGGER IF NOT EXISTS login_attempts_no_delete
        BEFORE DELETE ON login_attempts
        BEGIN
            SELECT RAISE(ABORT, 'login_attempts is append-only');
        END"#,
    ],
    revert: &[
        "DROP TRIGGER IF EXISTS login_attempts_no_update",
        "DROP TRIGGER IF EXISTS login_attempts_no_delete",
    ],
};

/// The schema of the attempt store, in application order.
pub fn all_migrations() -> Vec<Box<dyn Migration<Sqlite>>> {
    vec![
        Box::new(LOGIN_ATTEMPTS),
        Box::new(LOGIN_ATTEMPT_KEYS),
        Box::new(APPEND_ONLY_LOGIN_ATTEMPTS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn setup_test() {
        let _ = tracing_subscriber::fmt().try_init();
    }

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create pool")
    }

    #[tokio::test]
    async fn test_migrations() -> Result<(), MigrationError> {
        setup_test();

        let manager = SqliteMigrationManager::new(memory_pool().await);
        manager.initialize().await?;
        assert_eq!(manager.current_version().await?, None);

        let migrations = all_migrations();
        assert_eq!(manager.up(&migrations).await?, [1, 2, 3]);
        assert_eq!(manager.current_version().await?, Some(3));

        let applied = manager.applied().await?;
        let names: Vec<_> = applied.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "create_login_attempts",
                "index_login_attempt_keys",
                "append_only_login_attempts"
            ]
        );

        assert_eq!(manager.down(&migrations).await?, [3, 2, 1]);
        assert_eq!(manager.current_version().await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_up_down_up() -> Result<(), MigrationError> {
        setup_test();

        let manager = SqliteMigrationManager::new(memory_pool().await);
        manager.initialize().await?;

        let migrations = all_migrations();
        manager.up(&migrations).await?;
        manager.down(&migrations).await?;
        manager.up(&migrations).await?;

        assert!(manager.applied_versions().await?.contains(&3));

        Ok(())
    }

    #[tokio::test]
    async fn test_up_is_idempotent() -> Result<(), MigrationError> {
        let manager = SqliteMigrationManager::new(memory_pool().await);
        manager.initialize().await?;

        let migrations = all_migrations();
        manager.up(&migrations).await?;
        assert!(manager.up(&migrations).await?.is_empty());

        assert_eq!(manager.applied().await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_up_applies_only_new_versions() -> Result<(), MigrationError> {
        let manager = SqliteMigrationManager::new(memory_pool().await);
        manager.initialize().await?;

        let mut migrations = all_migrations();
        let newest = migrations.pop().expect("schema has versions");
        assert_eq!(manager.up(&migrations).await?, [1, 2]);

        migrations.push(newest);
        assert_eq!(manager.up(&migrations).await?, [3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_order_list_runs_nothing() -> Result<(), MigrationError> {
        let manager = SqliteMigrationManager::new(memory_pool().await);
        manager.initialize().await?;

        let mut migrations = all_migrations();
        migrations.swap(0, 1);
        assert!(matches!(
            manager.up(&migrations).await,
            Err(MigrationError::OutOfOrder { .. })
        ));
        assert_eq!(manager.current_version().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_attempt_log_rejects_mutation() -> Result<(), MigrationError> {
        let pool = memory_pool().await;
        let manager = SqliteMigrationManager::new(pool.clone());
        manager.initialize().await?;
        manager.up(&all_migrations()).await?;

        sqlx::query(
            "INSERT INTO login_attempts (identifier, source_address, succeeded, occurred_at) VALUES ('a@x.com', 'unknown', 0, 1000)",
        )
        .execute(&pool)
        .await?;

        assert!(
            sqlx::query("UPDATE login_attempts SET succeeded = 1")
                .execute(&pool)
                .await
                .is_err()
        );
        assert!(
            sqlx::query("DELETE FROM login_attempts")
                .execute(&pool)
                .await
                .is_err()
        );

        // Lock expiry must be after the attempt
        assert!(
            sqlx::query(
                "INSERT INTO login_attempts (identifier, source_address, succeeded, occurred_at, locked_until) VALUES ('a@x.com', 'unknown', 0, 1000, 1000)",
            )
            .execute(&pool)
            .await
            .is_err()
        );

        Ok(())
    }
}
