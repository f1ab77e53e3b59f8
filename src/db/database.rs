use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid withdrawal status: {0}")]
    InvalidStatus(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative status of a withdrawal request, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
    Cancelled,
    Failed,
}

impl WithdrawalStatus {
    /// No further processing is permitted once a withdrawal reaches these.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Cancelled => "cancelled",
            WithdrawalStatus::Failed => "failed",
        }
    }

    /// Store-side guard, independent of the advisory lock.
    ///
    /// Repeating the current status is refused so callers do not emit
    /// duplicate notifications.
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        if *self == next {
            return false;
        }
        !self.is_terminal()
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(WithdrawalStatus::Pending),
            "processing" => Ok(WithdrawalStatus::Processing),
            "completed" => Ok(WithdrawalStatus::Completed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            "cancelled" => Ok(WithdrawalStatus::Cancelled),
            "failed" => Ok(WithdrawalStatus::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub withdrawal_id: String,
    pub user_id: i64,
    pub status: WithdrawalStatus,
    pub crypto_currency: String,
    pub network_code: String,
    pub wallet_address: String,
    /// Net amount to pay out, in `crypto_currency` units.
    pub crypto_amount: Decimal,
    pub local_amount: Decimal,
    pub local_currency: String,
    pub tx_hash: Option<String>,
    pub cancellation_reason: Option<String>,
    pub executed_by: Option<i64>,
    pub failed_by: Option<i64>,
    pub processing_start: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub failure_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Withdrawal {
    /// A fresh pending request, as created by the user-facing bot.
    pub fn pending(
        withdrawal_id: &str,
        user_id: i64,
        crypto_currency: &str,
        network_code: &str,
        wallet_address: &str,
        crypto_amount: Decimal,
    ) -> Self {
        Self {
            withdrawal_id: withdrawal_id.to_string(),
            user_id,
            status: WithdrawalStatus::Pending,
            crypto_currency: crypto_currency.to_string(),
            network_code: network_code.to_string(),
            wallet_address: wallet_address.to_string(),
            crypto_amount,
            local_amount: Decimal::ZERO,
            local_currency: String::new(),
            tx_hash: None,
            cancellation_reason: None,
            executed_by: None,
            failed_by: None,
            processing_start: None,
            completion_time: None,
            failure_time: None,
            created_at: Utc::now(),
        }
    }

    /// Apply an accepted status update to the in-memory record.
    pub fn apply(&mut self, update: &WithdrawalStatusUpdate) {
        self.status = update.status;
        if let Some(reason) = &update.reason {
            self.cancellation_reason = Some(reason.clone());
        }
        if let Some(admin) = update.executed_by() {
            self.executed_by = Some(admin);
        }
        if let Some(admin) = update.failed_by() {
            self.failed_by = Some(admin);
        }
        if let Some(tx_hash) = &update.tx_hash {
            self.tx_hash = Some(tx_hash.clone());
        }
        match update.status {
            WithdrawalStatus::Processing => self.processing_start = Some(update.at),
            WithdrawalStatus::Completed => self.completion_time = Some(update.at),
            WithdrawalStatus::Failed => self.failure_time = Some(update.at),
            _ => {}
        }
    }
}

#[derive(Debug, FromRow)]
struct WithdrawalRow {
    withdrawal_id: String,
    user_id: i64,
    status: String,
    crypto_currency: String,
    network_code: String,
    wallet_address: String,
    crypto_amount: Decimal,
    local_amount: Decimal,
    local_currency: String,
    tx_hash: Option<String>,
    cancellation_reason: Option<String>,
    executed_by: Option<i64>,
    failed_by: Option<i64>,
    processing_start: Option<DateTime<Utc>>,
    completion_time: Option<DateTime<Utc>>,
    failure_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = StoreError;

    fn try_from(row: WithdrawalRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            withdrawal_id: row.withdrawal_id,
            user_id: row.user_id,
            crypto_currency: row.crypto_currency,
            network_code: row.network_code,
            wallet_address: row.wallet_address,
            crypto_amount: row.crypto_amount,
            local_amount: row.local_amount,
            local_currency: row.local_currency,
            tx_hash: row.tx_hash,
            cancellation_reason: row.cancellation_reason,
            executed_by: row.executed_by,
            failed_by: row.failed_by,
            processing_start: row.processing_start,
            completion_time: row.completion_time,
            failure_time: row.failure_time,
            created_at: row.created_at,
        })
    }
}

/// Requested status change plus the audit fields that go with it.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalStatusUpdate {
    pub status: WithdrawalStatus,
    pub admin_id: Option<i64>,
    pub reason: Option<String>,
    pub tx_hash: Option<String>,
    pub at: DateTime<Utc>,
}

impl WithdrawalStatusUpdate {
    pub fn processing(admin_id: i64) -> Self {
        Self {
            status: WithdrawalStatus::Processing,
            admin_id: Some(admin_id),
            reason: None,
            tx_hash: None,
            at: Utc::now(),
        }
    }

    pub fn completed(admin_id: i64, tx_hash: &str) -> Self {
        Self {
            status: WithdrawalStatus::Completed,
            admin_id: Some(admin_id),
            reason: None,
            tx_hash: Some(tx_hash.to_string()),
            at: Utc::now(),
        }
    }

    pub fn failed(admin_id: i64, reason: &str) -> Self {
        Self {
            status: WithdrawalStatus::Failed,
            admin_id: Some(admin_id),
            reason: Some(reason.to_string()),
            tx_hash: None,
            at: Utc::now(),
        }
    }

    pub fn rejected(admin_id: i64, reason: &str) -> Self {
        Self {
            status: WithdrawalStatus::Rejected,
            admin_id: Some(admin_id),
            reason: Some(reason.to_string()),
            tx_hash: None,
            at: Utc::now(),
        }
    }

    fn executed_by(&self) -> Option<i64> {
        match self.status {
            WithdrawalStatus::Processing | WithdrawalStatus::Completed => self.admin_id,
            _ => None,
        }
    }

    fn failed_by(&self) -> Option<i64> {
        match self.status {
            WithdrawalStatus::Failed | WithdrawalStatus::Rejected | WithdrawalStatus::Cancelled => {
                self.admin_id
            }
            _ => None,
        }
    }

    fn time_columns(
        &self,
    ) -> (
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
        Option<DateTime<Utc>>,
    ) {
        match self.status {
            WithdrawalStatus::Processing => (Some(self.at), None, None),
            WithdrawalStatus::Completed => (None, Some(self.at), None),
            WithdrawalStatus::Failed => (None, None, Some(self.at)),
            _ => (None, None, None),
        }
    }
}

/// Persistent withdrawal records, owned outside the lock manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    async fn get_withdrawal(&self, withdrawal_id: &str) -> Result<Option<Withdrawal>, StoreError>;

    /// Returns `false` when the record is missing or the current status
    /// refuses the transition.
    async fn update_withdrawal_status(
        &self,
        withdrawal_id: &str,
        update: WithdrawalStatusUpdate,
    ) -> Result<bool, StoreError>;
}

const SELECT_WITHDRAWAL: &str = r#"
    SELECT withdrawal_id, user_id, status, crypto_currency, network_code, wallet_address,
           crypto_amount, local_amount, local_currency, tx_hash, cancellation_reason,
           executed_by, failed_by, processing_start, completion_time, failure_time, created_at
    FROM withdrawal_requests
    WHERE withdrawal_id = $1
"#;

/// PostgreSQL backed store over the `withdrawal_requests` table.
#[derive(Clone)]
pub struct PgWithdrawalStore {
    pool: PgPool,
}

impl PgWithdrawalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WithdrawalStore for PgWithdrawalStore {
    async fn get_withdrawal(&self, withdrawal_id: &str) -> Result<Option<Withdrawal>, StoreError> {
        let row = sqlx::query_as::<_, WithdrawalRow>(SELECT_WITHDRAWAL)
            .bind(withdrawal_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Withdrawal::try_from).transpose()
    }

    async fn update_withdrawal_status(
        &self,
        withdrawal_id: &str,
        update: WithdrawalStatusUpdate,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT status FROM withdrawal_requests WHERE withdrawal_id = $1 FOR UPDATE",
        )
        .bind(withdrawal_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            warn!(withdrawal_id = %withdrawal_id, "Status update for unknown withdrawal");
            return Ok(false);
        };
        let current: WithdrawalStatus = current.parse()?;

        if !current.can_transition_to(update.status) {
            warn!(
                withdrawal_id = %withdrawal_id,
                "Refusing withdrawal status update {} -> {}", current, update.status
            );
            return Ok(false);
        }

        let (processing_start, completion_time, failure_time) = update.time_columns();

        sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = $2,
                cancellation_reason = COALESCE($3, cancellation_reason),
                executed_by = COALESCE($4, executed_by),
                failed_by = COALESCE($5, failed_by),
                tx_hash = COALESCE($6, tx_hash),
                processing_start = COALESCE($7, processing_start),
                completion_time = COALESCE($8, completion_time),
                failure_time = COALESCE($9, failure_time)
            WHERE withdrawal_id = $1
            "#,
        )
        .bind(withdrawal_id)
        .bind(update.status.as_str())
        .bind(update.reason.as_deref())
        .bind(update.executed_by())
        .bind(update.failed_by())
        .bind(update.tx_hash.as_deref())
        .bind(processing_start)
        .bind(completion_time)
        .bind(failure_time)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = %withdrawal_id,
            "Withdrawal status updated {} -> {}", current, update.status
        );
        Ok(true)
    }
}
