use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::{
    StoreError, Withdrawal, WithdrawalStatus, WithdrawalStatusUpdate, WithdrawalStore,
};
use crate::lock::{
    format_duration, Acquisition, LockError, LockStatus, WithdrawalLockManager,
};
use crate::notify::{Audience, Notifier};
use crate::payout::{PayoutError, PayoutExecutor, PayoutRequest, TxId};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What happened to an admin's request to act on a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { tx_hash: TxId },
    Failed { reason: String },
    Rejected,
    /// Another admin holds the lock.
    Busy { admin_name: String, elapsed: Duration },
    /// Same admin clicked again while their request is in flight.
    Duplicate,
    Terminal(WithdrawalStatus),
    NotPending(WithdrawalStatus),
    NotFound,
}

impl ProcessOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessOutcome::Completed { .. } => "completed",
            ProcessOutcome::Failed { .. } => "failed",
            ProcessOutcome::Rejected => "rejected",
            ProcessOutcome::Busy { .. } => "busy",
            ProcessOutcome::Duplicate => "duplicate",
            ProcessOutcome::Terminal(_) => "terminal",
            ProcessOutcome::NotPending(_) => "not_pending",
            ProcessOutcome::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Completed { tx_hash } => write!(f, "Withdrawal sent, tx {}", tx_hash),
            ProcessOutcome::Failed { reason } => write!(f, "Withdrawal failed: {}", reason),
            ProcessOutcome::Rejected => f.write_str("Withdrawal rejected"),
            ProcessOutcome::Busy {
                admin_name,
                elapsed,
            } => write!(
                f,
                "Already being processed by {} for {}",
                admin_name,
                format_duration(*elapsed)
            ),
            ProcessOutcome::Duplicate => f.write_str("Request already in progress"),
            ProcessOutcome::Terminal(status) => write!(f, "Withdrawal already {}", status),
            ProcessOutcome::NotPending(status) => {
                write!(f, "Withdrawal is {}, expected pending", status)
            }
            ProcessOutcome::NotFound => f.write_str("Withdrawal not found"),
        }
    }
}

/// Drives an admin's approve or reject action under the withdrawal lock.
///
/// The lock is released on every exit path once acquired, unless it already
/// expired and went to another admin.
pub struct WithdrawalProcessor {
    manager: Arc<WithdrawalLockManager>,
    store: Arc<dyn WithdrawalStore>,
    payout: Arc<dyn PayoutExecutor>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
}

impl WithdrawalProcessor {
    pub fn new(
        manager: Arc<WithdrawalLockManager>,
        store: Arc<dyn WithdrawalStore>,
        payout: Arc<dyn PayoutExecutor>,
        notifier: Arc<dyn Notifier>,
        max_attempts: u32,
    ) -> Self {
        Self {
            manager,
            store,
            payout,
            notifier,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Approve and pay out a pending withdrawal.
    pub async fn execute(
        &self,
        withdrawal_id: &str,
        admin_id: i64,
        admin_name: &str,
    ) -> Result<ProcessOutcome, ProcessError> {
        if let Some(refusal) = self.lock(withdrawal_id, admin_id, admin_name).await? {
            return Ok(refusal);
        }

        let result = self.execute_locked(withdrawal_id, admin_id, admin_name).await;
        self.manager.release_held_by(withdrawal_id, admin_id).await;
        result
    }

    /// Reject a pending withdrawal without paying out.
    pub async fn reject(
        &self,
        withdrawal_id: &str,
        admin_id: i64,
        admin_name: &str,
        reason: &str,
    ) -> Result<ProcessOutcome, ProcessError> {
        if let Some(refusal) = self.lock(withdrawal_id, admin_id, admin_name).await? {
            return Ok(refusal);
        }

        let result = self
            .reject_locked(withdrawal_id, admin_id, admin_name, reason)
            .await;
        self.manager.release_held_by(withdrawal_id, admin_id).await;
        result
    }

    /// `None` when the lock was taken, otherwise the outcome to report.
    async fn lock(
        &self,
        withdrawal_id: &str,
        admin_id: i64,
        admin_name: &str,
    ) -> Result<Option<ProcessOutcome>, ProcessError> {
        let refusal = match self
            .manager
            .try_acquire(withdrawal_id, admin_id, admin_name)
            .await?
        {
            Acquisition::Acquired => return Ok(None),
            Acquisition::Terminal(status) => ProcessOutcome::Terminal(status),
            Acquisition::Duplicate => ProcessOutcome::Duplicate,
            Acquisition::HeldBy {
                admin_name,
                elapsed,
                ..
            } => ProcessOutcome::Busy {
                admin_name,
                elapsed,
            },
        };
        Ok(Some(refusal))
    }

    /// Re-read the record under the lock; only pending withdrawals proceed.
    async fn pending_withdrawal(
        &self,
        withdrawal_id: &str,
    ) -> Result<Result<Withdrawal, ProcessOutcome>, ProcessError> {
        Ok(match self.store.get_withdrawal(withdrawal_id).await? {
            None => Err(ProcessOutcome::NotFound),
            Some(w) if w.status != WithdrawalStatus::Pending => {
                Err(ProcessOutcome::NotPending(w.status))
            }
            Some(w) => Ok(w),
        })
    }

    async fn execute_locked(
        &self,
        withdrawal_id: &str,
        admin_id: i64,
        admin_name: &str,
    ) -> Result<ProcessOutcome, ProcessError> {
        let withdrawal = match self.pending_withdrawal(withdrawal_id).await? {
            Ok(withdrawal) => withdrawal,
            Err(outcome) => return Ok(outcome),
        };

        if !self
            .store
            .update_withdrawal_status(withdrawal_id, WithdrawalStatusUpdate::processing(admin_id))
            .await?
        {
            // lost a race against a writer that bypasses the lock
            let status = self
                .store
                .get_withdrawal(withdrawal_id)
                .await?
                .map(|w| w.status)
                .unwrap_or(WithdrawalStatus::Pending);
            return Ok(ProcessOutcome::NotPending(status));
        }
        self.manager
            .update_lock_status(withdrawal_id, LockStatus::Processing, None, None)
            .await;

        match self.pay_out(&withdrawal).await {
            Ok(tx_hash) => {
                self.manager
                    .update_lock_status(withdrawal_id, LockStatus::Completed, None, Some(&tx_hash))
                    .await;
                let recorded = self
                    .store
                    .update_withdrawal_status(
                        withdrawal_id,
                        WithdrawalStatusUpdate::completed(admin_id, &tx_hash),
                    )
                    .await;
                if let Err(e) = &recorded {
                    // funds already left: the tx hash must survive in the logs
                    error!(
                        withdrawal_id = %withdrawal_id,
                        "Paid out in {} but failed to record completion: {}", tx_hash, e
                    );
                }
                recorded?;

                info!(
                    withdrawal_id = %withdrawal_id,
                    "Withdrawal completed by {} ({}) in {}", admin_name, admin_id, tx_hash
                );
                self.deliver(
                    Audience::User(withdrawal.user_id),
                    &format!(
                        "✅ Your withdrawal `{}` of {} {} has been sent.\nTx: `{}`",
                        withdrawal_id, withdrawal.crypto_amount, withdrawal.crypto_currency, tx_hash
                    ),
                )
                .await;
                self.deliver(
                    Audience::Admins,
                    &format!(
                        "Withdrawal `{}` completed by {}.\nTx: `{}`",
                        withdrawal_id, admin_name, tx_hash
                    ),
                )
                .await;

                Ok(ProcessOutcome::Completed { tx_hash })
            }
            Err(e) => {
                let reason = e.to_string();
                // a lost lock may belong to someone else by now
                if !matches!(e, PayoutError::LockLost(_)) {
                    self.manager
                        .update_lock_status(withdrawal_id, LockStatus::Failed, Some(&reason), None)
                        .await;
                }
                self.store
                    .update_withdrawal_status(
                        withdrawal_id,
                        WithdrawalStatusUpdate::failed(admin_id, &reason),
                    )
                    .await?;

                warn!(withdrawal_id = %withdrawal_id, "Withdrawal failed: {}", reason);
                self.deliver(
                    Audience::User(withdrawal.user_id),
                    &format!(
                        "❌ Your withdrawal `{}` could not be processed. \
                         Support will contact you.",
                        withdrawal_id
                    ),
                )
                .await;
                self.deliver(
                    Audience::Admins,
                    &format!(
                        "Withdrawal `{}` failed for {}: {}",
                        withdrawal_id, admin_name, reason
                    ),
                )
                .await;

                Ok(ProcessOutcome::Failed { reason })
            }
        }
    }

    async fn pay_out(&self, withdrawal: &Withdrawal) -> Result<TxId, PayoutError> {
        let request = PayoutRequest::from(withdrawal);

        let mut expected = 0;
        loop {
            expected += 1;
            let attempt = self
                .manager
                .increment_attempts(&withdrawal.withdrawal_id)
                .await;
            if attempt != expected {
                // zero means the lock is gone; any other jump means it was re-acquired
                error!(
                    withdrawal_id = %withdrawal.withdrawal_id,
                    "Lock lost before payout attempt {} (counter at {})", expected, attempt
                );
                return Err(PayoutError::LockLost(withdrawal.withdrawal_id.clone()));
            }

            match self.payout.pay_out(&request).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        withdrawal_id = %withdrawal.withdrawal_id,
                        "Payout attempt {}/{} failed: {}", attempt, self.max_attempts, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reject_locked(
        &self,
        withdrawal_id: &str,
        admin_id: i64,
        admin_name: &str,
        reason: &str,
    ) -> Result<ProcessOutcome, ProcessError> {
        let withdrawal = match self.pending_withdrawal(withdrawal_id).await? {
            Ok(withdrawal) => withdrawal,
            Err(outcome) => return Ok(outcome),
        };

        if !self
            .store
            .update_withdrawal_status(
                withdrawal_id,
                WithdrawalStatusUpdate::rejected(admin_id, reason),
            )
            .await?
        {
            return Ok(ProcessOutcome::NotPending(withdrawal.status));
        }

        info!(
            withdrawal_id = %withdrawal_id,
            "Withdrawal rejected by {} ({}): {}", admin_name, admin_id, reason
        );
        self.deliver(
            Audience::User(withdrawal.user_id),
            &format!(
                "Your withdrawal `{}` was rejected.\nReason: {}",
                withdrawal_id, reason
            ),
        )
        .await;

        Ok(ProcessOutcome::Rejected)
    }

    /// Notifications are best effort and never change the outcome.
    async fn deliver(&self, audience: Audience, text: &str) {
        if let Err(e) = self.notifier.notify(audience, text).await {
            warn!("Failed to notify {}: {}", audience, e);
        }
    }
}
