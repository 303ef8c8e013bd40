use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::EventError;

/// Security events emitted by the lockout service.
///
/// Events are emitted after the attempt is durable, so handlers observe facts
/// that are already in the attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A failed attempt was recorded without tripping the lock.
    LoginFailed {
        identifier: String,
        /// Failures in the current streak, including this one
        failed_attempts: u32,
        source_address: String,
        timestamp: DateTime<Utc>,
    },

    /// A failed attempt tripped the threshold and stamped a lock.
    ///
    /// This is a security-critical event that should trigger alerts.
    AccountLocked {
        identifier: String,
        failed_attempts: u32,
        locked_until: DateTime<Utc>,
        source_address: String,
        timestamp: DateTime<Utc>,
    },

    /// A successful attempt was recorded, ending any failure streak.
    LoginSucceeded {
        identifier: String,
        source_address: String,
        timestamp: DateTime<Utc>,
    },
}

/// A trait for handling events emitted by the event bus
///
/// Implementors can be registered with the [`EventBus`] to receive events.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that fans events out to registered handlers
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers, stopping at the first error.
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }
}
