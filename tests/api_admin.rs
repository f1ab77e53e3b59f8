mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use withdrawal_coordinator::api::admin_routes;
use withdrawal_coordinator::db::WithdrawalStatus;
use withdrawal_coordinator::processor::WithdrawalProcessor;

use common::{manager, store_with, MockExecutor, MockTelegram};

async fn app(payout: MockExecutor) -> Router {
    let store = store_with(&[("wd-1", WithdrawalStatus::Pending)]).await;
    let mut notifier = MockTelegram::new();
    notifier.expect_notify().returning(|_, _| Ok(()));
    let processor = WithdrawalProcessor::new(
        manager(store.clone()),
        store,
        Arc::new(payout),
        Arc::new(notifier),
        1,
    );
    admin_routes(Arc::new(processor))
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn execute_returns_tx_hash() {
    let mut payout = MockExecutor::new();
    payout.expect_pay_out().returning(|_| Ok("0xfeed".to_string()));
    let app = app(payout).await;

    let (status, body) = post(
        app.clone(),
        "/withdrawals/wd-1/execute",
        json!({ "admin_id": 7, "admin_name": "Ali" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["tx_hash"], "0xfeed");

    let (status, body) = post(
        app,
        "/withdrawals/wd-1/execute",
        json!({ "admin_id": 8, "admin_name": "Sara" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["outcome"], "terminal");
}

#[tokio::test]
async fn reject_requires_reason() {
    let app = app(MockExecutor::new()).await;

    let (status, _) = post(
        app.clone(),
        "/withdrawals/wd-1/reject",
        json!({ "admin_id": 7, "admin_name": "Ali", "reason": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        app,
        "/withdrawals/wd-1/reject",
        json!({ "admin_id": 7, "admin_name": "Ali", "reason": "KYC failed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "rejected");
}

#[tokio::test]
async fn unknown_withdrawal_is_not_found() {
    let app = app(MockExecutor::new()).await;

    let (status, body) = post(
        app,
        "/withdrawals/nope/execute",
        json!({ "admin_id": 7, "admin_name": "Ali" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["outcome"], "not_found");
}
