use async_trait::async_trait;
use recouply_core::{Event, EventHandler, error::EventError};

/// Writes login guard security events to the `recouply::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
        match event {
            Event::LoginFailed {
                identifier,
                failed_attempts,
                source_address,
                timestamp,
            } => {
                tracing::info!(
                    target: "recouply::audit",
                    identifier = %identifier,
                    failed_attempts,
                    source_address = %source_address,
                    timestamp = %timestamp,
                    "login_failed"
                );
            }
            Event::AccountLocked {
                identifier,
                failed_attempts,
                locked_until,
                source_address,
                timestamp,
            } => {
                tracing::warn!(
                    target: "recouply::audit",
                    identifier = %identifier,
                    failed_attempts,
                    locked_until = %locked_until,
                    source_address = %source_address,
                    timestamp = %timestamp,
                    "account_locked"
                );
            }
            Event::LoginSucceeded {
                identifier,
                source_address,
                timestamp,
            } => {
                tracing::info!(
                    target: "recouply::audit",
                    identifier = %identifier,
                    source_address = %source_address,
                    timestamp = %timestamp,
                    "login_succeeded"
                );
            }
        }

        Ok(())
    }
}
