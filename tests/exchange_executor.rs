use mockito::{Matcher, Server, ServerGuard};
use rust_decimal::Decimal;
use serde_json::json;
use withdrawal_coordinator::config::ExchangeConfig;
use withdrawal_coordinator::payout::{
    ExchangePayoutExecutor, PayoutError, PayoutExecutor, PayoutRequest,
};

const APPLY: &str = "/sapi/v1/capital/withdraw/apply";
const HISTORY: &str = "/sapi/v1/capital/withdraw/history";

fn executor(server: &ServerGuard, confirm_poll_attempts: u32) -> ExchangePayoutExecutor {
    let config = ExchangeConfig {
        base_url: server.url(),
        max_retries: 3,
        retry_delay_ms: 1,
        recv_window_ms: 5000,
        confirm_poll_attempts,
        confirm_poll_interval_ms: 1,
    };
    ExchangePayoutExecutor::new(&config, "key".into(), "secret".into())
}

fn request() -> PayoutRequest {
    PayoutRequest {
        reference: "wd-1".into(),
        currency: "USDT".into(),
        address: "TXYZabc".into(),
        amount: Decimal::new(12550, 2),
        network: "TRX".into(),
    }
}

#[tokio::test]
async fn returns_chain_tx_id_once_broadcast() {
    let mut server = Server::new_async().await;
    let apply = server
        .mock("POST", APPLY)
        .match_header("X-MBX-APIKEY", "key")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("coin".into(), "USDT".into()),
            Matcher::UrlEncoded("amount".into(), "125.500000".into()),
            Matcher::UrlEncoded("withdrawOrderId".into(), "wd-1".into()),
            Matcher::Regex("signature=[0-9a-f]{64}".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"ex-1"}"#)
        .expect(1)
        .create_async()
        .await;
    let history = server
        .mock("GET", HISTORY)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                { "id": "ex-0", "txId": "0xold", "status": 6 },
                { "id": "ex-1", "txId": "0xabc", "status": 6 }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let tx_id = executor(&server, 3).pay_out(&request()).await.unwrap();

    assert_eq!(tx_id, "0xabc");
    apply.assert_async().await;
    history.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried() {
    let mut server = Server::new_async().await;
    let apply = server
        .mock("POST", APPLY)
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .expect(3)
        .create_async()
        .await;

    let result = executor(&server, 1).pay_out(&request()).await;

    assert!(matches!(result, Err(PayoutError::Api { status: 503, .. })));
    apply.assert_async().await;
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let apply = server
        .mock("POST", APPLY)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-4026,"msg":"Insufficient balance"}"#)
        .expect(1)
        .create_async()
        .await;

    match executor(&server, 1).pay_out(&request()).await {
        Err(PayoutError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("Insufficient balance"));
        }
        other => panic!("expected API error, got {:?}", other),
    }
    apply.assert_async().await;
}

#[tokio::test]
async fn exchange_side_failure_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", APPLY)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"id":"ex-1"}"#)
        .create_async()
        .await;
    server
        .mock("GET", HISTORY)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id":"ex-1","status":5}]"#)
        .create_async()
        .await;

    let result = executor(&server, 3).pay_out(&request()).await;

    assert!(matches!(result, Err(PayoutError::Rejected(_))));
}

#[tokio::test]
async fn falls_back_to_exchange_id_without_tx_id() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", APPLY)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"id":"ex-1"}"#)
        .create_async()
        .await;
    let history = server
        .mock("GET", HISTORY)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id":"ex-1","txId":"","status":4}]"#)
        .expect(2)
        .create_async()
        .await;

    let tx_id = executor(&server, 2).pay_out(&request()).await.unwrap();

    assert_eq!(tx_id, "ex-1");
    history.assert_async().await;
}

#[tokio::test]
async fn non_positive_amount_never_reaches_exchange() {
    let mut server = Server::new_async().await;
    let apply = server
        .mock("POST", APPLY)
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut zero = request();
    zero.amount = Decimal::ZERO;
    let result = executor(&server, 1).pay_out(&zero).await;

    assert!(matches!(result, Err(PayoutError::InvalidAmount(_))));
    apply.assert_async().await;
}
