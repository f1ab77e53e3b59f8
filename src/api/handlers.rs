use axum::{extract::Path, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::lock::{format_duration, LockStatus, LockSummary, WithdrawalLockManager};
use crate::processor::{ProcessError, ProcessOutcome, WithdrawalProcessor};

pub async fn hello_world() -> &'static str {
    "Withdrawal coordinator is running"
}

pub async fn handle_list_locks(
    Extension(manager): Extension<Arc<WithdrawalLockManager>>,
) -> Json<HashMap<String, LockSummary>> {
    Json(manager.get_active_locks().await)
}

#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub withdrawal_id: String,
    pub admin_id: i64,
    pub admin_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_formatted: String,
    /// Seconds until the lock goes stale and may be taken over.
    pub expires_in_secs: u64,
    pub status: LockStatus,
    pub attempts: u32,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
}

pub async fn handle_get_lock(
    Extension(manager): Extension<Arc<WithdrawalLockManager>>,
    Path(withdrawal_id): Path<String>,
) -> Result<Json<LockResponse>, (StatusCode, String)> {
    let lock = manager.get_lock_info(&withdrawal_id).await.ok_or((
        StatusCode::NOT_FOUND,
        format!("No lock held on withdrawal {}", withdrawal_id),
    ))?;

    let elapsed = lock.elapsed();
    Ok(Json(LockResponse {
        duration_formatted: format_duration(elapsed),
        expires_in_secs: manager.timeout().saturating_sub(elapsed).as_secs(),
        withdrawal_id: lock.withdrawal_id,
        admin_id: lock.admin_id,
        admin_name: lock.admin_name,
        started_at: lock.started_at,
        status: lock.status,
        attempts: lock.attempts,
        tx_hash: lock.tx_hash,
        error_message: lock.error_message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdminAction {
    pub admin_id: i64,
    pub admin_name: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub outcome: &'static str,
    pub message: String,
    pub tx_hash: Option<String>,
}

fn outcome_status(outcome: &ProcessOutcome) -> StatusCode {
    match outcome {
        ProcessOutcome::Completed { .. } | ProcessOutcome::Rejected => StatusCode::OK,
        ProcessOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
        ProcessOutcome::NotFound => StatusCode::NOT_FOUND,
        ProcessOutcome::Busy { .. }
        | ProcessOutcome::Duplicate
        | ProcessOutcome::Terminal(_)
        | ProcessOutcome::NotPending(_) => StatusCode::CONFLICT,
    }
}

fn respond(
    result: Result<ProcessOutcome, ProcessError>,
) -> Result<(StatusCode, Json<ActionResponse>), (StatusCode, String)> {
    let outcome = result.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let tx_hash = match &outcome {
        ProcessOutcome::Completed { tx_hash } => Some(tx_hash.clone()),
        _ => None,
    };

    Ok((
        outcome_status(&outcome),
        Json(ActionResponse {
            outcome: outcome.kind(),
            message: outcome.to_string(),
            tx_hash,
        }),
    ))
}

pub async fn handle_execute_withdrawal(
    Extension(processor): Extension<Arc<WithdrawalProcessor>>,
    Path(withdrawal_id): Path<String>,
    Json(action): Json<AdminAction>,
) -> Result<(StatusCode, Json<ActionResponse>), (StatusCode, String)> {
    respond(
        processor
            .execute(&withdrawal_id, action.admin_id, &action.admin_name)
            .await,
    )
}

pub async fn handle_reject_withdrawal(
    Extension(processor): Extension<Arc<WithdrawalProcessor>>,
    Path(withdrawal_id): Path<String>,
    Json(action): Json<AdminAction>,
) -> Result<(StatusCode, Json<ActionResponse>), (StatusCode, String)> {
    let reason = action
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "A rejection reason is required".to_string()))?;

    respond(
        processor
            .reject(&withdrawal_id, action.admin_id, &action.admin_name, reason)
            .await,
    )
}
