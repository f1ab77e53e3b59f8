use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    handle_execute_withdrawal, handle_get_lock, handle_list_locks, handle_reject_withdrawal,
    hello_world,
};
use crate::lock::WithdrawalLockManager;
use crate::processor::WithdrawalProcessor;

/// Read-only ops surface over the in-process lock table.
pub fn create_router(manager: Arc<WithdrawalLockManager>) -> Router {
    Router::new()
        .route("/", get(hello_world))
        .route("/locks", get(handle_list_locks))
        .route("/locks/{withdrawal_id}", get(handle_get_lock))
        .layer(Extension(manager))
        .layer(TraceLayer::new_for_http())
}

/// Admin actions, for front-ends that cannot embed the processor.
pub fn admin_routes(processor: Arc<WithdrawalProcessor>) -> Router {
    Router::new()
        .route(
            "/withdrawals/{withdrawal_id}/execute",
            post(handle_execute_withdrawal),
        )
        .route(
            "/withdrawals/{withdrawal_id}/reject",
            post(handle_reject_withdrawal),
        )
        .layer(Extension(processor))
        .layer(TraceLayer::new_for_http())
}
