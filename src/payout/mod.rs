//! Payout executors
//!
//! Backends that actually move funds for an approved withdrawal. Each one
//! retries transient failures internally; callers only see the final result.

pub mod exchange;
pub mod retry;
pub mod router;
pub mod wallet;

pub use exchange::ExchangePayoutExecutor;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use router::PayoutRouter;
pub use wallet::WalletPayoutExecutor;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::Withdrawal;

/// Transaction id (or exchange withdrawal id while the chain tx is pending).
pub type TxId = String;

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: String, required: String },

    #[error("Payout rejected: {0}")]
    Rejected(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Transaction confirmation timeout: {0}")]
    ConfirmationTimeout(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// The withdrawal lock expired or changed hands between attempts.
    #[error("Withdrawal lock lost during payout: {0}")]
    LockLost(String),
}

impl PayoutError {
    /// Transient failures that are safe to retry without risking a double payout.
    pub fn is_retryable(&self) -> bool {
        match self {
            PayoutError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            PayoutError::Api { status, .. } => *status == 429 || *status >= 500,
            PayoutError::Rpc(_) | PayoutError::NonceConflict(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutRequest {
    /// Our withdrawal id, passed along as the idempotency reference.
    pub reference: String,
    pub currency: String,
    pub address: String,
    pub amount: Decimal,
    pub network: String,
}

impl From<&Withdrawal> for PayoutRequest {
    fn from(withdrawal: &Withdrawal) -> Self {
        Self {
            reference: withdrawal.withdrawal_id.clone(),
            currency: withdrawal.crypto_currency.clone(),
            address: withdrawal.wallet_address.trim().to_string(),
            amount: withdrawal.crypto_amount,
            network: withdrawal.network_code.clone(),
        }
    }
}

/// Moves funds for one withdrawal and returns the resulting transaction id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutExecutor: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn pay_out(&self, request: &PayoutRequest) -> Result<TxId, PayoutError>;
}
