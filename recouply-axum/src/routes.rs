use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post},
};
use recouply_core::{LockoutService, LoginAttemptRepository};

use crate::{
    error::{ApiError, Result},
    types::*,
};

pub struct LoginGuardState<R: LoginAttemptRepository> {
    pub service: Arc<LockoutService<R>>,
}

impl<R: LoginAttemptRepository> Clone for LoginGuardState<R> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

/// Build the router with the attempt endpoints under `mount_path`.
///
/// `mount_path` is expected without a trailing slash; an empty path mounts
/// the endpoints at the root.
pub fn create_router<R>(service: Arc<LockoutService<R>>, mount_path: &str) -> Router
where
    R: LoginAttemptRepository,
{
    let state = LoginGuardState { service };

    let (record_path, status_path) = if mount_path.is_empty() {
        ("/".to_string(), "/status".to_string())
    } else {
        (mount_path.to_string(), format!("{mount_path}/status"))
    };

    Router::new()
        .route("/health", get(health_handler::<R>))
        .route(&record_path, post(record_attempt_handler::<R>))
        .route(&status_path, post(status_handler::<R>))
        .with_state(state)
}

// A blank body address falls back to the peer
fn source_address(body: Option<String>, connection_info: &ConnectionInfo) -> Option<String> {
    body.filter(|addr| !addr.trim().is_empty())
        .or_else(|| connection_info.ip.clone())
}

async fn health_handler<R>(State(state): State<LoginGuardState<R>>) -> Result<impl IntoResponse>
where
    R: LoginAttemptRepository,
{
    state
        .service
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn record_attempt_handler<R>(
    State(state): State<LoginGuardState<R>>,
    connection_info: ConnectionInfo,
    payload: std::result::Result<Json<RecordAttemptRequest>, JsonRejection>,
) -> Result<impl IntoResponse>
where
    R: LoginAttemptRepository,
{
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let succeeded = request
        .success
        .ok_or_else(|| ApiError::BadRequest("success must be a boolean".to_string()))?;
    let email = request.email.unwrap_or_default();
    let source_address = source_address(request.ip_address, &connection_info);

    tracing::debug!(
        succeeded,
        source_address = ?source_address,
        user_agent = ?connection_info.user_agent,
        "Recording login attempt"
    );

    let outcome = state
        .service
        .record_attempt(&email, source_address.as_deref(), succeeded)
        .await?;

    Ok(Json(RecordAttemptResponse::from(outcome)))
}

async fn status_handler<R>(
    State(state): State<LoginGuardState<R>>,
    connection_info: ConnectionInfo,
    payload: std::result::Result<Json<StatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse>
where
    R: LoginAttemptRepository,
{
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let email = request.email.unwrap_or_default();
    let source_address = source_address(request.ip_address, &connection_info);

    let status = state
        .service
        .get_lockout_status(&email, source_address.as_deref())
        .await
        .map_err(|e| match e {
            e if e.is_storage_error() => ApiError::Unavailable(e.to_string()),
            e => ApiError::from(e),
        })?;

    Ok(Json(StatusResponse::from(status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode, header},
    };
    use chrono::{DateTime, Utc};
    use recouply_core::{
        Error, FailMode, KeyStrategy, LockoutConfig, LockoutPolicy, MemoryLoginAttemptRepository,
        error::StorageError,
        storage::{AppendOutcome, AttemptKey, AttemptStats, LoginAttempt, NewLoginAttempt},
    };
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    struct UnavailableRepository;

    #[async_trait]
    impl LoginAttemptRepository for UnavailableRepository {
        async fn get_attempt_stats(
            &self,
            _key: &AttemptKey,
            _since: DateTime<Utc>,
        ) -> std::result::Result<AttemptStats, Error> {
            Err(StorageError::Connection("store offline".into()).into())
        }

        async fn append_attempt(
            &self,
            _attempt: NewLoginAttempt,
            _policy: &LockoutPolicy,
        ) -> std::result::Result<AppendOutcome, Error> {
            Err(StorageError::Database("store offline".into()).into())
        }

        async fn list_attempts(
            &self,
            _identifier: &str,
            _limit: u32,
        ) -> std::result::Result<Vec<LoginAttempt>, Error> {
            Err(StorageError::Database("store offline".into()).into())
        }

        async fn health_check(&self) -> std::result::Result<(), Error> {
            Err(StorageError::Connection("store offline".into()).into())
        }
    }

    fn memory_service(
        config: LockoutConfig,
    ) -> Arc<LockoutService<MemoryLoginAttemptRepository>> {
        Arc::new(LockoutService::new(
            Arc::new(MemoryLoginAttemptRepository::new()),
            config,
        ))
    }

    fn app(config: LockoutConfig) -> Router {
        create_router(memory_service(config), "/login-attempts")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn failure(email: &str) -> Request<Body> {
        post_json(
            "/login-attempts",
            json!({ "email": email, "success": false }),
        )
    }

    #[tokio::test]
    async fn test_single_failure_leaves_three_attempts() {
        let app = app(LockoutConfig::default());

        let (status, body) = send(&app, failure("a@x.com")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "locked": false, "attemptsRemaining": 3, "willLock": false })
        );
    }

    #[tokio::test]
    async fn test_fifth_failure_locks_and_sixth_is_rejected() {
        let app = app(LockoutConfig::default());

        for expected_remaining in [3, 2, 1, 0] {
            let (status, body) = send(&app, failure("a@x.com")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["attemptsRemaining"], expected_remaining);
            assert_eq!(body["willLock"], false);
        }

        let (status, body) = send(&app, failure("a@x.com")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "locked": false, "attemptsRemaining": 0, "willLock": true })
        );

        let response = app.clone().oneshot(failure("a@x.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: i64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 900);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["locked"], true);
        assert!(body["lockedUntil"].is_string());
        assert_eq!(
            body["message"],
            "Too many failed login attempts. Please try again in 15 minute(s)."
        );

        // A correct password does not get through a lock either
        let (status, _) = send(
            &app,
            post_json(
                "/login-attempts",
                json!({ "email": "a@x.com", "success": true }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_success_after_failures_resets_streak() {
        let app = app(LockoutConfig::default());

        send(&app, failure("b@x.com")).await;
        send(&app, failure("b@x.com")).await;

        let (status, body) = send(
            &app,
            post_json(
                "/login-attempts",
                json!({ "email": "b@x.com", "success": true, "ipAddress": "10.0.0.1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["willLock"], false);

        let (_, body) = send(
            &app,
            post_json("/login-attempts/status", json!({ "email": "b@x.com" })),
        )
        .await;
        assert_eq!(
            body,
            json!({ "locked": false, "attemptsCount": 0, "lockedUntil": null })
        );
    }

    #[tokio::test]
    async fn test_status_reports_active_lock() {
        let app = app(LockoutConfig::default());

        for _ in 0..5 {
            send(&app, failure("c@x.com")).await;
        }

        let (status, body) = send(
            &app,
            post_json("/login-attempts/status", json!({ "email": "C@X.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locked"], true);
        assert_eq!(body["attemptsCount"], 5);
        assert!(body["lockedUntil"].is_string());
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let app = app(LockoutConfig::default());

        let cases = [
            json!({ "success": false }),
            json!({ "email": "   ", "success": false }),
            json!({ "email": "a@x.com" }),
            json!({ "email": "a@x.com", "success": "no" }),
            json!({ "email": 42, "success": false }),
        ];

        for case in cases {
            let (status, body) = send(&app, post_json("/login-attempts", case.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "case: {case}");
            assert!(body["error"].is_string(), "case: {case}");
        }

        let request = Request::builder()
            .method("POST")
            .uri("/login-attempts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_email_message() {
        let app = app(LockoutConfig::default());

        let (_, body) = send(
            &app,
            post_json("/login-attempts", json!({ "success": false })),
        )
        .await;
        assert_eq!(body, json!({ "error": "email is required" }));
    }

    #[tokio::test]
    async fn test_store_failure_on_record_is_500() {
        let service = Arc::new(LockoutService::new(
            Arc::new(UnavailableRepository),
            LockoutConfig {
                fail_mode: FailMode::Open,
                ..Default::default()
            },
        ));
        let app = create_router(service, "/login-attempts");

        let (status, body) = send(&app, failure("a@x.com")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_status_fail_modes() {
        let closed = create_router(
            Arc::new(LockoutService::new(
                Arc::new(UnavailableRepository),
                LockoutConfig::default(),
            )),
            "/login-attempts",
        );
        let (status, body) = send(
            &closed,
            post_json("/login-attempts/status", json!({ "email": "a@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());

        let open = create_router(
            Arc::new(LockoutService::new(
                Arc::new(UnavailableRepository),
                LockoutConfig {
                    fail_mode: FailMode::Open,
                    ..Default::default()
                },
            )),
            "/login-attempts",
        );
        let (status, body) = send(
            &open,
            post_json("/login-attempts/status", json!({ "email": "a@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locked"], false);
    }

    #[tokio::test]
    async fn test_peer_address_fallback() {
        let service = memory_service(LockoutConfig {
            key_strategy: KeyStrategy::SourceAddress,
            ..Default::default()
        });
        let app = create_router(service.clone(), "/login-attempts")
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4000))));

        send(&app, failure("a@x.com")).await;
        send(
            &app,
            post_json(
                "/login-attempts",
                json!({ "email": "a@x.com", "success": false, "ipAddress": "192.0.2.1" }),
            ),
        )
        .await;

        let attempts = service.recent_attempts("a@x.com", 10).await.unwrap();
        let sources: Vec<_> = attempts.iter().map(|a| a.source_address.as_str()).collect();
        assert_eq!(sources, ["192.0.2.1", "10.0.0.7"]);
    }

    #[tokio::test]
    async fn test_blank_body_address_uses_peer() {
        let service = memory_service(LockoutConfig::default());
        let app = create_router(service.clone(), "/login-attempts")
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 8], 4000))));

        send(
            &app,
            post_json(
                "/login-attempts",
                json!({ "email": "a@x.com", "success": false, "ipAddress": "  " }),
            ),
        )
        .await;

        let attempts = service.recent_attempts("a@x.com", 10).await.unwrap();
        assert_eq!(attempts[0].source_address, "10.0.0.8");
    }

    #[tokio::test]
    async fn test_unknown_source_without_connect_info() {
        let service = memory_service(LockoutConfig::default());
        let app = create_router(service.clone(), "/login-attempts");

        send(&app, failure("a@x.com")).await;

        let attempts = service.recent_attempts("a@x.com", 10).await.unwrap();
        assert_eq!(attempts[0].source_address, "unknown");
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(LockoutConfig::default());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let unavailable = create_router(
            Arc::new(LockoutService::new(
                Arc::new(UnavailableRepository),
                LockoutConfig::default(),
            )),
            "/login-attempts",
        );
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&unavailable, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_custom_mount_path() {
        let app = create_router(memory_service(LockoutConfig::default()), "/api/guard");

        let (status, _) = send(
            &app,
            post_json("/api/guard", json!({ "email": "a@x.com", "success": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response = app.clone().oneshot(failure("a@x.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
