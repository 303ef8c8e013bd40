use chrono::{DateTime, Utc};
use recouply_core::{LockoutStatus, RecordOutcome};
use serde::{Deserialize, Serialize};

/// Outcome of one credential check, reported by the login handler.
///
/// Every field is optional at the JSON layer so a missing value can be
/// answered with a specific message instead of a generic parse error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttemptRequest {
    pub email: Option<String>,
    pub success: Option<bool>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub email: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttemptResponse {
    pub locked: bool,
    pub attempts_remaining: u32,
    pub will_lock: bool,
}

impl From<RecordOutcome> for RecordAttemptResponse {
    fn from(outcome: RecordOutcome) -> Self {
        Self {
            locked: outcome.locked,
            attempts_remaining: outcome.attempts_remaining,
            will_lock: outcome.will_lock,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedResponse {
    pub locked: bool,
    pub locked_until: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub locked: bool,
    pub attempts_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl From<LockoutStatus> for StatusResponse {
    fn from(status: LockoutStatus) -> Self {
        Self {
            locked: status.is_locked,
            attempts_count: status.failed_attempts,
            locked_until: status.locked_until,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}
