//! # Recouply Axum Integration
//!
//! Axum routes exposing the login guard to a login handler. The handler asks
//! for the lock state before checking credentials and reports the outcome of
//! the check afterwards.
//!
//! ## Endpoints
//!
//! - `POST {mount}`: record an attempt, answering `429` while the key is locked
//! - `POST {mount}/status`: read-only lock state
//! - `GET /health`: store ping
//!
//! The mount path defaults to `/login-attempts`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::{net::SocketAddr, sync::Arc};
//! use recouply_core::{LockoutConfig, LockoutService, MemoryLoginAttemptRepository};
//!
//! #[tokio::main]
//! async fn main() {
//!     let repository = Arc::new(MemoryLoginAttemptRepository::new());
//!     let service = Arc::new(LockoutService::new(repository, LockoutConfig::default()));
//!
//!     let app = recouply_axum::routes(service).build();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<SocketAddr>(),
//!     )
//!     .await
//!     .unwrap();
//! }
//! ```

mod error;
mod extractors;
mod routes;
mod types;

pub use error::{ApiError, Result, lock_message};
pub use routes::{LoginGuardState, create_router};
pub use types::{
    ConnectionInfo, HealthResponse, LockedResponse, RecordAttemptRequest, RecordAttemptResponse,
    StatusRequest, StatusResponse,
};

use axum::Router;
use recouply_core::{LockoutService, LoginAttemptRepository};
use std::sync::Arc;

pub const DEFAULT_MOUNT_PATH: &str = "/login-attempts";

/// Create the login guard routes for your Axum application.
///
/// # Arguments
///
/// * `service` - An Arc-wrapped lockout service configured with an attempt store
///
/// # Returns
///
/// A builder that produces a Router with its state already applied
pub fn routes<R>(service: Arc<LockoutService<R>>) -> LoginGuardRouterBuilder<R>
where
    R: LoginAttemptRepository,
{
    LoginGuardRouterBuilder {
        service,
        mount_path: DEFAULT_MOUNT_PATH.to_string(),
    }
}

/// Builder for configuring the login guard routes
pub struct LoginGuardRouterBuilder<R: LoginAttemptRepository> {
    service: Arc<LockoutService<R>>,
    mount_path: String,
}

impl<R: LoginAttemptRepository> LoginGuardRouterBuilder<R> {
    /// Set the path the attempt endpoints are mounted under
    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        let mount_path = mount_path.into();
        let trimmed = mount_path.trim_matches('/');
        self.mount_path = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Build the router with the configured options
    pub fn build(self) -> Router {
        create_router(self.service, &self.mount_path)
    }
}

impl<R: LoginAttemptRepository> From<LoginGuardRouterBuilder<R>> for Router {
    fn from(builder: LoginGuardRouterBuilder<R>) -> Self {
        builder.build()
    }
}
