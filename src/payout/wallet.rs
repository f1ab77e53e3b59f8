use alloy_json_rpc::RpcError;
use alloy_primitives::{hex, Address, U256};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, trace, warn};
use url::Url;

use super::retry::{retry_with_backoff, RetryPolicy};
use super::{PayoutError, PayoutExecutor, PayoutRequest, TxId};
use crate::config::WalletConfig;

sol! {
    function transfer(address to, uint256 value) external returns (bool);
    function balanceOf(address owner) external view returns (uint256);
}

/// Pays out directly on-chain by sending a BEP20 token transfer.
///
/// Transactions are submitted with `eth_sendTransaction` from `from_address`;
/// signing and nonce management belong to the external signer behind the
/// RPC endpoint.
pub struct WalletPayoutExecutor {
    client: RpcClient,
    token_contract: Address,
    from: Address,
    chain_id: u64,
    token_decimals: u32,
    gas_limit: u64,
    retry: RetryPolicy,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
}

impl WalletPayoutExecutor {
    pub fn new(rpc_url: Url, config: &WalletConfig) -> Result<Self, PayoutError> {
        let client = ClientBuilder::default().http(rpc_url);

        let token_contract = parse_address(&config.token_contract)?;
        let from = parse_address(&config.from_address)?;
        if config.token_decimals > 18 {
            return Err(PayoutError::InvalidAmount(format!(
                "unsupported token decimals {}",
                config.token_decimals
            )));
        }

        Ok(Self {
            client,
            token_contract,
            from,
            chain_id: config.chain_id,
            token_decimals: config.token_decimals,
            gas_limit: config.gas_limit,
            retry: RetryPolicy::new(config.max_retries, config.retry_delay_ms),
            receipt_poll_attempts: config.receipt_poll_attempts,
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
        })
    }

    async fn token_balance(&self) -> Result<U256, PayoutError> {
        let data = balanceOfCall { owner: self.from }.abi_encode();
        let call = serde_json::json!({
            "to": self.token_contract,
            "data": format!("0x{}", hex::encode(&data)),
        });

        let result: String = self
            .client
            .request("eth_call", (call, "latest"))
            .await
            .map_err(map_rpc_error)?;

        parse_quantity(&result)
    }

    /// Balance check plus broadcast. The only part of a payout that may be retried.
    async fn submit_transfer(&self, to: Address, value: U256) -> Result<TxId, PayoutError> {
        let balance = self.token_balance().await?;
        if balance < value {
            return Err(PayoutError::InsufficientBalance {
                available: balance.to_string(),
                required: value.to_string(),
            });
        }

        let data = transferCall { to, value }.abi_encode();
        let tx_params = serde_json::json!({
            "from": self.from,
            "to": self.token_contract,
            "gas": format!("0x{:x}", self.gas_limit),
            "chainId": format!("0x{:x}", self.chain_id),
            "data": format!("0x{}", hex::encode(&data)),
        });

        let tx_hash: String = self
            .client
            .request("eth_sendTransaction", [tx_params])
            .await
            .map_err(map_rpc_error)?;
        info!("Submitted token transfer {} to {}", tx_hash, to);

        Ok(tx_hash)
    }

    /// Poll for the receipt of an already broadcast transfer.
    ///
    /// Only ever fails with `TransactionFailed` or `ConfirmationTimeout`, both
    /// carrying the hash and neither retryable.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<(), PayoutError> {
        for attempt in 1..=self.receipt_poll_attempts {
            let polled: Result<Option<serde_json::Value>, PayoutError> = self
                .client
                .request("eth_getTransactionReceipt", [tx_hash.to_string()])
                .await
                .map_err(map_rpc_error);

            match polled {
                Ok(Some(receipt)) => {
                    let status = receipt["status"].as_str().unwrap_or("0x0");
                    return match parse_quantity(status) {
                        Ok(status) if status == U256::from(1u8) => Ok(()),
                        _ => Err(PayoutError::TransactionFailed(tx_hash.to_string())),
                    };
                }
                Ok(None) => trace!(
                    "No receipt for {} yet ({}/{})",
                    tx_hash,
                    attempt,
                    self.receipt_poll_attempts
                ),
                Err(e) => warn!(
                    "Receipt poll for {} failed ({}/{}): {}",
                    tx_hash, attempt, self.receipt_poll_attempts, e
                ),
            }
            sleep(self.receipt_poll_interval).await;
        }

        // the transaction may still land: never resubmit blindly
        Err(PayoutError::ConfirmationTimeout(tx_hash.to_string()))
    }
}

#[async_trait]
impl PayoutExecutor for WalletPayoutExecutor {
    fn name(&self) -> &'static str {
        "wallet"
    }

    async fn pay_out(&self, request: &PayoutRequest) -> Result<TxId, PayoutError> {
        let to = parse_address(&request.address)?;
        let value = to_base_units(request.amount, self.token_decimals)?;

        let tx_hash = retry_with_backoff(self.retry, "wallet transfer", |_| {
            self.submit_transfer(to, value)
        })
        .await?;

        // broadcast: from here on nothing may be resubmitted
        self.wait_for_receipt(&tx_hash).await?;

        info!(
            withdrawal_id = %request.reference,
            "Sent {} {} to {} in {}", request.amount, request.currency, to, tx_hash
        );
        Ok(tx_hash)
    }
}

fn map_rpc_error<E>(e: RpcError<E>) -> PayoutError
where
    RpcError<E>: Display,
{
    match e {
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_string();
            let lower = message.to_ascii_lowercase();
            if lower.contains("nonce too low") || lower.contains("underpriced") {
                PayoutError::NonceConflict(message)
            } else {
                PayoutError::Rejected(format!("RPC error {} - {}", payload.code, message))
            }
        }
        other => PayoutError::Rpc(other.to_string()),
    }
}

/// Parse a `0x`-prefixed 20 byte hex address.
pub fn parse_address(raw: &str) -> Result<Address, PayoutError> {
    let trimmed = raw.trim();
    let valid_shape = trimmed.len() == 42
        && trimmed.starts_with("0x")
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid_shape {
        return Err(PayoutError::InvalidAddress(trimmed.to_string()));
    }
    Address::from_str(trimmed).map_err(|_| PayoutError::InvalidAddress(trimmed.to_string()))
}

/// Convert a token amount into its integer base units.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, PayoutError> {
    if amount <= Decimal::ZERO {
        return Err(PayoutError::InvalidAmount(amount.to_string()));
    }
    let scale = Decimal::from(10u64.pow(decimals));
    let units = amount
        .checked_mul(scale)
        .and_then(|scaled| scaled.trunc().to_u128())
        .ok_or_else(|| PayoutError::InvalidAmount(amount.to_string()))?;
    Ok(U256::from(units))
}

fn parse_quantity(raw: &str) -> Result<U256, PayoutError> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| PayoutError::Rpc(format!("Invalid hex quantity {}: {}", raw, e)))
}
