use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use recouply_core::{Error, error::ValidationError, storage::retry_after_seconds};
use serde_json::json;
use thiserror::Error;

use crate::types::LockedResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Account locked until {locked_until}")]
    Locked { locked_until: DateTime<Utc> },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if let Some(locked_until) = err.locked_until() {
            return ApiError::Locked { locked_until };
        }

        match err {
            Error::Validation(
                ValidationError::MissingField(msg)
                | ValidationError::InvalidIdentifier(msg)
                | ValidationError::InvalidField(msg),
            ) => ApiError::BadRequest(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// User-facing lockout message with the remaining time rounded up to minutes.
pub fn lock_message(retry_after_seconds: i64) -> String {
    let minutes = (retry_after_seconds.max(1) + 59) / 60;
    format!("Too many failed login attempts. Please try again in {minutes} minute(s).")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Locked { locked_until } => {
                let retry_after = retry_after_seconds(locked_until, Utc::now());
                let body = Json(LockedResponse {
                    locked: true,
                    locked_until,
                    message: lock_message(retry_after),
                });

                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after.to_string())],
                    body,
                )
                    .into_response();
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => {
                tracing::error!(error = %msg, "Lockout check unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Login protection is temporarily unavailable".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Login attempt request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to record login attempt".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use recouply_core::error::{LockoutError, StorageError};

    #[test]
    fn test_lock_message_rounds_up() {
        assert_eq!(
            lock_message(900),
            "Too many failed login attempts. Please try again in 15 minute(s)."
        );
        assert_eq!(
            lock_message(841),
            "Too many failed login attempts. Please try again in 15 minute(s)."
        );
        assert_eq!(
            lock_message(1),
            "Too many failed login attempts. Please try again in 1 minute(s)."
        );
    }

    #[test]
    fn test_from_core_error() {
        let locked_until = Utc::now();
        let err: ApiError = Error::from(LockoutError::AccountLocked { locked_until }).into();
        assert!(matches!(err, ApiError::Locked { locked_until: t } if t == locked_until));

        let err: ApiError =
            Error::from(ValidationError::MissingField("email is required".into())).into();
        assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "email is required"));

        let err: ApiError = Error::from(StorageError::Database("disk full".into())).into();
        assert!(matches!(err, ApiError::InternalError(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unavailable("down".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::InternalError("boom".into())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let response = ApiError::Locked {
            locked_until: Utc::now() + chrono::Duration::minutes(15),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
