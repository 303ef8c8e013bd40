//! Attempt store backends the login guard can be built on.

use std::sync::Arc;

use async_trait::async_trait;
use recouply_core::{Error, LoginAttemptRepository, MemoryLoginAttemptRepository};
use recouply_storage_sqlite::{SqliteLoginAttemptRepository, SqliteStorage};

/// A backend that owns its schema and hands out the attempt repository.
#[async_trait]
pub trait AttemptStore: Send + Sync + 'static {
    type Repository: LoginAttemptRepository;

    /// Bring the backend schema up to date.
    async fn migrate(&self) -> Result<(), Error>;

    fn repository(&self) -> Arc<Self::Repository>;
}

/// SQLite-backed attempt store.
pub struct SqliteAttemptStore {
    storage: SqliteStorage,
    repository: Arc<SqliteLoginAttemptRepository>,
}

impl SqliteAttemptStore {
    pub fn new(storage: SqliteStorage) -> Self {
        let repository = Arc::new(storage.repository());
        Self {
            storage,
            repository,
        }
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }
}

#[async_trait]
impl AttemptStore for SqliteAttemptStore {
    type Repository = SqliteLoginAttemptRepository;

    async fn migrate(&self) -> Result<(), Error> {
        self.storage.migrate().await
    }

    fn repository(&self) -> Arc<Self::Repository> {
        self.repository.clone()
    }
}

/// Process-local attempt store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryAttemptStore {
    repository: Arc<MemoryLoginAttemptRepository>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    type Repository = MemoryLoginAttemptRepository;

    async fn migrate(&self) -> Result<(), Error> {
        Ok(())
    }

    fn repository(&self) -> Arc<Self::Repository> {
        self.repository.clone()
    }
}
