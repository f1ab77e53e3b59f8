use mockito::{Matcher, Mock, Server, ServerGuard};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use url::Url;
use withdrawal_coordinator::config::WalletConfig;
use withdrawal_coordinator::payout::{
    PayoutError, PayoutExecutor, PayoutRequest, WalletPayoutExecutor,
};

const TX_HASH: &str = "0xdeadbeef";
const FULL_BALANCE: &str = "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

fn executor(server: &ServerGuard) -> WalletPayoutExecutor {
    let config = WalletConfig {
        chain_id: 56,
        token_contract: "0x55d398326f99059fF775485246999027B3197955".into(),
        from_address: "0x0000000000000000000000000000000000000001".into(),
        token_decimals: 18,
        gas_limit: 100_000,
        max_retries: 3,
        retry_delay_ms: 1,
        receipt_poll_attempts: 3,
        receipt_poll_interval_ms: 1,
        bep20_networks: vec!["bsc".into()],
    };
    let url = Url::parse(&server.url()).unwrap();
    WalletPayoutExecutor::new(url, &config).unwrap()
}

fn request() -> PayoutRequest {
    PayoutRequest {
        reference: "wd-1".into(),
        currency: "USDT".into(),
        address: "0x0000000000000000000000000000000000000002".into(),
        amount: Decimal::new(12550, 2),
        network: "BSC".into(),
    }
}

fn rpc_result(result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 0, "result": result }).to_string()
}

fn rpc_mock(server: &mut ServerGuard, method: &str) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_status(200)
        .with_header("content-type", "application/json")
}

async fn balance(server: &mut ServerGuard, hex: &str) -> Mock {
    rpc_mock(server, "eth_call")
        .with_body(rpc_result(json!(hex)))
        .create_async()
        .await
}

async fn send_ok(server: &mut ServerGuard, expected: usize) -> Mock {
    rpc_mock(server, "eth_sendTransaction")
        .with_body(rpc_result(json!(TX_HASH)))
        .expect(expected)
        .create_async()
        .await
}

async fn receipt(server: &mut ServerGuard, status: &str) -> Mock {
    rpc_mock(server, "eth_getTransactionReceipt")
        .with_body(rpc_result(json!({ "transactionHash": TX_HASH, "status": status })))
        .create_async()
        .await
}

#[tokio::test]
async fn confirmed_transfer_returns_hash() {
    let mut server = Server::new_async().await;
    balance(&mut server, FULL_BALANCE).await;
    let send = send_ok(&mut server, 1).await;
    receipt(&mut server, "0x1").await;

    let tx_hash = executor(&server).pay_out(&request()).await.unwrap();

    assert_eq!(tx_hash, TX_HASH);
    send.assert_async().await;
}

#[tokio::test]
async fn receipt_poll_errors_never_rebroadcast() {
    let mut server = Server::new_async().await;
    balance(&mut server, FULL_BALANCE).await;
    let send = send_ok(&mut server, 1).await;
    let receipts = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(
            json!({ "method": "eth_getTransactionReceipt" }),
        ))
        .with_status(503)
        .with_body("upstream busy")
        .expect(3)
        .create_async()
        .await;

    let result = executor(&server).pay_out(&request()).await;

    match result {
        Err(e @ PayoutError::ConfirmationTimeout(_)) => {
            assert!(!e.is_retryable());
            assert!(e.to_string().contains(TX_HASH));
        }
        other => panic!("expected confirmation timeout, got {:?}", other),
    }
    send.assert_async().await;
    receipts.assert_async().await;
}

#[tokio::test]
async fn reverted_transfer_is_not_retried() {
    let mut server = Server::new_async().await;
    balance(&mut server, FULL_BALANCE).await;
    let send = send_ok(&mut server, 1).await;
    receipt(&mut server, "0x0").await;

    let result = executor(&server).pay_out(&request()).await;

    assert!(matches!(result, Err(PayoutError::TransactionFailed(ref hash)) if hash == TX_HASH));
    send.assert_async().await;
}

#[tokio::test]
async fn insufficient_balance_skips_broadcast() {
    let mut server = Server::new_async().await;
    balance(&mut server, "0x01").await;
    let send = send_ok(&mut server, 0).await;

    let result = executor(&server).pay_out(&request()).await;

    assert!(matches!(result, Err(PayoutError::InsufficientBalance { .. })));
    send.assert_async().await;
}

#[tokio::test]
async fn nonce_conflicts_are_resubmitted() {
    let mut server = Server::new_async().await;
    balance(&mut server, FULL_BALANCE).await;
    let send = rpc_mock(&mut server, "eth_sendTransaction")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "error": { "code": -32000, "message": "nonce too low" }
            })
            .to_string(),
        )
        .expect(3)
        .create_async()
        .await;

    let result = executor(&server).pay_out(&request()).await;

    assert!(matches!(result, Err(PayoutError::NonceConflict(_))));
    send.assert_async().await;
}

#[tokio::test]
async fn malformed_address_never_reaches_node() {
    let mut server = Server::new_async().await;
    let any = server
        .mock("POST", "/")
        .expect(0)
        .create_async()
        .await;

    let mut bad = request();
    bad.address = "TXYZnotanevmaddress".into();
    let result = executor(&server).pay_out(&bad).await;

    assert!(matches!(result, Err(PayoutError::InvalidAddress(_))));
    any.assert_async().await;
}
