//! SQLite implementation of the login attempt repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recouply_core::{
    Error,
    config::LockoutPolicy,
    error::StorageError,
    repositories::LoginAttemptRepository,
    storage::{AppendOutcome, AttemptKey, AttemptStats, LoginAttempt, NewLoginAttempt},
};
use sqlx::{SqliteConnection, SqlitePool};

/// SQLite repository for the login attempt log.
#[derive(Clone)]
pub struct SqliteLoginAttemptRepository {
    pool: SqlitePool,
}

impl SqliteLoginAttemptRepository {
    /// Create a new SQLite login attempt repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginAttempt {
    id: i64,
    identifier: String,
    source_address: String,
    succeeded: bool,
    occurred_at: i64,
    locked_until: Option<i64>,
}

impl TryFrom<SqliteLoginAttempt> for LoginAttempt {
    type Error = Error;

    fn try_from(row: SqliteLoginAttempt) -> Result<Self, Self::Error> {
        Ok(LoginAttempt {
            id: row.id,
            identifier: row.identifier,
            source_address: row.source_address,
            succeeded: row.succeeded,
            occurred_at: from_millis(row.occurred_at)?,
            locked_until: row.locked_until.map(from_millis).transpose()?,
        })
    }
}

/// Internal struct for attempt stats query
#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptStats {
    failed_streak: i64,
    locked_until: Option<i64>,
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        StorageError::Database(format!("Invalid timestamp in attempt log: {millis}")).into()
    })
}

/// WHERE fragment and bind values selecting the attempts of a key.
fn key_filter(key: &AttemptKey) -> (&'static str, Vec<&str>) {
    match key {
        AttemptKey::Identifier(identifier) => ("identifier = ?", vec![identifier.as_str()]),
        AttemptKey::SourceAddress(source_address) => {
            ("source_address = ?", vec![source_address.as_str()])
        }
        AttemptKey::Composite {
            identifier,
            source_address,
        } => (
            "identifier = ? AND source_address = ?",
            vec![identifier.as_str(), source_address.as_str()],
        ),
    }
}

async fn fetch_stats(
    conn: &mut SqliteConnection,
    key: &AttemptKey,
    since: DateTime<Utc>,
) -> Result<AttemptStats, Error> {
    let (filter, values) = key_filter(key);

    // The streak only counts failures written after the key's latest success
    let sql = format!(
        r#"
        SELECT
            (SELECT COUNT(*) FROM login_attempts
             WHERE {filter} AND succeeded = 0 AND occurred_at > ?
             AND id > COALESCE(
                 (SELECT MAX(id) FROM login_attempts WHERE {filter} AND succeeded = 1),
                 0
             )) AS failed_streak,
            (SELECT MAX(locked_until) FROM login_attempts WHERE {filter}) AS locked_until
        "#
    );

    let mut query = sqlx::query_as::<_, SqliteAttemptStats>(&sql);
    for value in &values {
        query = query.bind(*value);
    }
    query = query.bind(since.timestamp_millis());
    for _ in 0..2 {
        for value in &values {
            query = query.bind(*value);
        }
    }

    let row = query.fetch_one(&mut *conn).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to get attempt stats");
        StorageError::Database("Failed to get attempt stats".to_string())
    })?;

    Ok(AttemptStats {
        failed_streak: u32::try_from(row.failed_streak).unwrap_or(u32::MAX),
        locked_until: row.locked_until.map(from_millis).transpose()?,
    })
}

async fn insert_attempt(
    conn: &mut SqliteConnection,
    attempt: &NewLoginAttempt,
    locked_until: Option<DateTime<Utc>>,
) -> Result<LoginAttempt, Error> {
    let row = sqlx::query_as::<_, SqliteLoginAttempt>(
        r#"
        INSERT INTO login_attempts (identifier, source_address, succeeded, occurred_at, locked_until)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, identifier, source_address, succeeded, occurred_at, locked_until
        "#,
    )
    .bind(&attempt.identifier)
    .bind(&attempt.source_address)
    .bind(attempt.succeeded)
    .bind(attempt.occurred_at.timestamp_millis())
    .bind(locked_until.map(|t| t.timestamp_millis()))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to record login attempt");
        StorageError::Database("Failed to record login attempt".to_string())
    })?;

    row.try_into()
}

async fn evaluate_and_insert(
    conn: &mut SqliteConnection,
    attempt: &NewLoginAttempt,
    policy: &LockoutPolicy,
) -> Result<AppendOutcome, Error> {
    let now = attempt.occurred_at;
    let key = policy
        .key_strategy
        .key_for(&attempt.identifier, &attempt.source_address);
    let prior = fetch_stats(conn, &key, policy.window_start(now)?).await?;

    if let Some(locked_until) = prior.active_lock(now) {
        return Ok(AppendOutcome::Rejected { locked_until });
    }

    let locked_until = policy.lock_expiry(&prior, attempt.succeeded, now)?;
    let attempt = insert_attempt(conn, attempt, locked_until).await?;

    Ok(AppendOutcome::Recorded { attempt, prior })
}

/// Runs evaluate-then-insert under `BEGIN IMMEDIATE`.
///
/// The write lock is taken before the read, so a concurrent writer waits for
/// this transaction instead of reading the same pre-lock streak. Any error
/// drops the transaction, which rolls it back before the connection is reused.
async fn append_immediate(
    pool: SqlitePool,
    attempt: NewLoginAttempt,
    policy: LockoutPolicy,
) -> Result<AppendOutcome, Error> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
        tracing::error!(error = %e, "Failed to begin attempt transaction");
        StorageError::Database("Failed to begin attempt transaction".to_string())
    })?;

    let outcome = evaluate_and_insert(&mut tx, &attempt, &policy).await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to commit attempt transaction");
        StorageError::Database("Failed to commit login attempt".to_string())
    })?;

    Ok(outcome)
}

#[async_trait]
impl LoginAttemptRepository for SqliteLoginAttemptRepository {
    async fn get_attempt_stats(
        &self,
        key: &AttemptKey,
        since: DateTime<Utc>,
    ) -> Result<AttemptStats, Error> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to acquire connection");
            StorageError::Connection("Failed to acquire connection".to_string())
        })?;

        fetch_stats(&mut conn, key, since).await
    }

    async fn append_attempt(
        &self,
        attempt: NewLoginAttempt,
        policy: &LockoutPolicy,
    ) -> Result<AppendOutcome, Error> {
        // Detached so a dropped request cannot leave the connection mid-transaction
        tokio::spawn(append_immediate(self.pool.clone(), attempt, *policy))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Attempt append task failed");
                StorageError::Database("Failed to record login attempt".to_string())
            })?
    }

    async fn list_attempts(
        &self,
        identifier: &str,
        limit: u32,
    ) -> Result<Vec<LoginAttempt>, Error> {
        let rows = sqlx::query_as::<_, SqliteLoginAttempt>(
            r#"
            SELECT id, identifier, source_address, succeeded, occurred_at, locked_until
            FROM login_attempts
            WHERE identifier = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(identifier)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list login attempts");
            StorageError::Database("Failed to list login attempts".to_string())
        })?;

        rows.into_iter().map(LoginAttempt::try_from).collect()
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Attempt store health check failed");
                StorageError::Connection("Attempt store unreachable".to_string())
            })?;
        Ok(())
    }
}
