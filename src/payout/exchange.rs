use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::retry::{retry_with_backoff, RetryPolicy};
use super::{PayoutError, PayoutExecutor, PayoutRequest, TxId};
use crate::config::ExchangeConfig;

type HmacSha256 = Hmac<Sha256>;

const WITHDRAW_APPLY_PATH: &str = "/sapi/v1/capital/withdraw/apply";
const WITHDRAW_HISTORY_PATH: &str = "/sapi/v1/capital/withdraw/history";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

// Exchange withdraw-history status codes that mean the payout will not happen
const FAILED_STATUSES: [i32; 3] = [1, 3, 5];

#[derive(Debug, Deserialize)]
struct WithdrawApplyResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawHistoryEntry {
    id: String,
    #[serde(rename = "txId", default)]
    tx_id: Option<String>,
    #[serde(default)]
    status: i32,
}

/// Pays out through the centralized exchange's withdrawal API.
///
/// Requests are HMAC-SHA256 signed; the withdrawal id is sent as
/// `withdrawOrderId` so a retried submission cannot pay twice.
pub struct ExchangePayoutExecutor {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    retry: RetryPolicy,
    confirm_poll_attempts: u32,
    confirm_poll_interval: Duration,
}

impl ExchangePayoutExecutor {
    pub fn new(config: &ExchangeConfig, api_key: String, api_secret: String) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            recv_window_ms: config.recv_window_ms,
            retry: RetryPolicy::new(config.max_retries, config.retry_delay_ms),
            confirm_poll_attempts: config.confirm_poll_attempts,
            confirm_poll_interval: Duration::from_millis(config.confirm_poll_interval_ms),
        }
    }

    /// Build from config, reading credentials from the environment.
    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self::new(config, config.get_api_key(), config.get_api_secret())
    }

    fn sign(&self, payload: &str) -> Result<String, PayoutError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| PayoutError::Rejected(format!("Invalid API secret: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Url-encoded query with timestamp, recvWindow and signature appended.
    fn signed_query(&self, params: &[(&str, &str)]) -> Result<String, PayoutError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let recv_window = self.recv_window_ms.to_string();

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("timestamp", &timestamp);
        serializer.append_pair("recvWindow", &recv_window);
        let query = serializer.finish();

        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, PayoutError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PayoutError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn submit_withdrawal(&self, request: &PayoutRequest) -> Result<String, PayoutError> {
        let amount = format!("{:.6}", request.amount);
        let query = self.signed_query(&[
            ("coin", request.currency.as_str()),
            ("address", request.address.as_str()),
            ("amount", amount.as_str()),
            ("network", request.network.as_str()),
            ("withdrawOrderId", request.reference.as_str()),
        ])?;

        let url = format!("{}{}?{}", self.base_url, WITHDRAW_APPLY_PATH, query);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let body: WithdrawApplyResponse = Self::check_response(response).await?.json().await?;
        Ok(body.id)
    }

    /// Look up the on-chain tx id of an exchange withdrawal, if assigned yet.
    async fn find_tx_id(&self, exchange_id: &str) -> Result<Option<String>, PayoutError> {
        let query = self.signed_query(&[])?;
        let url = format!("{}{}?{}", self.base_url, WITHDRAW_HISTORY_PATH, query);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let history: Vec<WithdrawHistoryEntry> =
            Self::check_response(response).await?.json().await?;

        let Some(entry) = history.into_iter().find(|entry| entry.id == exchange_id) else {
            return Ok(None);
        };

        if FAILED_STATUSES.contains(&entry.status) {
            return Err(PayoutError::Rejected(format!(
                "exchange withdrawal {} ended with status {}",
                exchange_id, entry.status
            )));
        }

        Ok(entry.tx_id.filter(|tx| !tx.is_empty()))
    }
}

#[async_trait]
impl PayoutExecutor for ExchangePayoutExecutor {
    fn name(&self) -> &'static str {
        "exchange"
    }

    async fn pay_out(&self, request: &PayoutRequest) -> Result<TxId, PayoutError> {
        if request.amount <= rust_decimal::Decimal::ZERO {
            return Err(PayoutError::InvalidAmount(request.amount.to_string()));
        }

        let exchange_id = retry_with_backoff(self.retry, "exchange withdraw", |_| {
            self.submit_withdrawal(request)
        })
        .await?;
        info!(
            withdrawal_id = %request.reference,
            "Exchange accepted withdrawal {} of {} {} on {}",
            exchange_id, request.amount, request.currency, request.network
        );

        for attempt in 1..=self.confirm_poll_attempts {
            match self.find_tx_id(&exchange_id).await {
                Ok(Some(tx_id)) => {
                    info!(withdrawal_id = %request.reference, "Exchange tx id {}", tx_id);
                    return Ok(tx_id);
                }
                Ok(None) => debug!(
                    "Exchange withdrawal {} has no tx id yet ({}/{})",
                    exchange_id, attempt, self.confirm_poll_attempts
                ),
                Err(e @ PayoutError::Rejected(_)) => return Err(e),
                Err(e) => warn!("Failed to poll exchange withdrawal {}: {}", exchange_id, e),
            }
            sleep(self.confirm_poll_interval).await;
        }

        // accepted by the exchange but not broadcast yet
        warn!(
            withdrawal_id = %request.reference,
            "No tx id for exchange withdrawal {} after polling, using exchange id", exchange_id
        );
        Ok(exchange_id)
    }
}
