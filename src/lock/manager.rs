use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::duration::format_duration;
use super::status::{LockStatus, TransitionError};
use crate::config::LockConfig;
use crate::db::{StoreError, WithdrawalStatus, WithdrawalStore};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Advisory lock held by one admin on one withdrawal.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionLock {
    pub withdrawal_id: String,
    pub admin_id: i64,
    pub admin_name: String,
    pub start_time: Instant,
    /// Wall-clock acquisition time, for display only.
    pub started_at: DateTime<Utc>,
    pub status: LockStatus,
    pub attempts: u32,
    pub last_update: Instant,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
}

impl TransactionLock {
    fn new(withdrawal_id: &str, admin_id: i64, admin_name: &str, now: Instant) -> Self {
        Self {
            withdrawal_id: withdrawal_id.to_string(),
            admin_id,
            admin_name: admin_name.to_string(),
            start_time: now,
            started_at: Utc::now(),
            status: LockStatus::Locked,
            attempts: 0,
            last_update: now,
            tx_hash: None,
            error_message: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.start_time)
    }
}

/// Dashboard view of a held lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockSummary {
    pub admin_id: i64,
    pub admin_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub duration_formatted: String,
    pub status: LockStatus,
    pub attempts: u32,
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired,
    /// The store already reports a final status for this withdrawal.
    Terminal(WithdrawalStatus),
    /// The holder asked again inside the duplicate window.
    Duplicate,
    HeldBy {
        admin_id: i64,
        admin_name: String,
        elapsed: Duration,
    },
}

impl Acquisition {
    #[inline]
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquisition::Acquired)
    }
}

/// Process-wide registry of advisory withdrawal locks.
///
/// One instance per process, shared through `Arc`. Every operation takes the
/// single internal mutex; only acquisition performs I/O (the terminal-status
/// read) while holding it, so that check and insert are atomic.
pub struct WithdrawalLockManager {
    locks: Mutex<HashMap<String, TransactionLock>>,
    store: Arc<dyn WithdrawalStore>,
    timeout: Duration,
    duplicate_window: Duration,
}

impl WithdrawalLockManager {
    pub fn new(store: Arc<dyn WithdrawalStore>, config: &LockConfig) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            store,
            timeout: config.timeout(),
            duplicate_window: config.duplicate_window(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Try to lock `withdrawal_id` for `admin_id`.
    ///
    /// Fails closed: any internal error is logged and reported as `false`.
    pub async fn acquire(&self, withdrawal_id: &str, admin_id: i64, admin_name: &str) -> bool {
        match self.try_acquire(withdrawal_id, admin_id, admin_name).await {
            Ok(acquisition) => acquisition.is_acquired(),
            Err(e) => {
                error!(
                    withdrawal_id = %withdrawal_id,
                    admin_id,
                    "Lock acquisition failed, refusing: {:?}", e
                );
                false
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but reports why a lock was refused.
    pub async fn try_acquire(
        &self,
        withdrawal_id: &str,
        admin_id: i64,
        admin_name: &str,
    ) -> Result<Acquisition, LockError> {
        let mut locks = self.locks.lock().await;

        // a terminal withdrawal is never re-locked, held or not
        if let Some(withdrawal) = self.store.get_withdrawal(withdrawal_id).await? {
            if withdrawal.status.is_terminal() {
                warn!(
                    withdrawal_id = %withdrawal_id,
                    "Refusing lock on withdrawal in terminal status {}", withdrawal.status
                );
                return Ok(Acquisition::Terminal(withdrawal.status));
            }
        }

        let now = Instant::now();

        if let Some(existing) = locks.get(withdrawal_id) {
            let elapsed = now.saturating_duration_since(existing.start_time);

            if elapsed > self.timeout {
                warn!(
                    withdrawal_id = %withdrawal_id,
                    "Discarding stale lock held by {} for {}",
                    existing.admin_name,
                    format_duration(elapsed)
                );
                locks.remove(withdrawal_id);
            } else if existing.admin_id == admin_id && elapsed < self.duplicate_window {
                warn!(
                    withdrawal_id = %withdrawal_id,
                    "Ignoring repeated lock request from {} ({})", admin_name, admin_id
                );
                return Ok(Acquisition::Duplicate);
            } else {
                info!(
                    withdrawal_id = %withdrawal_id,
                    "Lock refused for {}: held by {} for {}",
                    admin_name,
                    existing.admin_name,
                    format_duration(elapsed)
                );
                return Ok(Acquisition::HeldBy {
                    admin_id: existing.admin_id,
                    admin_name: existing.admin_name.clone(),
                    elapsed,
                });
            }
        }

        locks.insert(
            withdrawal_id.to_string(),
            TransactionLock::new(withdrawal_id, admin_id, admin_name, now),
        );
        info!(withdrawal_id = %withdrawal_id, "Locked by {} ({})", admin_name, admin_id);

        Ok(Acquisition::Acquired)
    }

    /// Drop the lock on `withdrawal_id`. Releasing an unheld id is a no-op.
    pub async fn release(&self, withdrawal_id: &str) {
        let mut locks = self.locks.lock().await;

        match locks.remove(withdrawal_id) {
            Some(lock) => info!(
                withdrawal_id = %withdrawal_id,
                "Released lock held by {} (status {}, {} attempts)",
                lock.admin_name,
                lock.status,
                lock.attempts
            ),
            None => info!(withdrawal_id = %withdrawal_id, "Not locked, ignoring release"),
        }
    }

    /// Drop the lock only if `admin_id` still holds it.
    ///
    /// Returns false when the lock expired or another admin took it over.
    pub async fn release_held_by(&self, withdrawal_id: &str, admin_id: i64) -> bool {
        let mut locks = self.locks.lock().await;

        match locks.get(withdrawal_id) {
            Some(lock) if lock.admin_id == admin_id => {
                if let Some(lock) = locks.remove(withdrawal_id) {
                    info!(
                        withdrawal_id = %withdrawal_id,
                        "Released lock held by {} (status {}, {} attempts)",
                        lock.admin_name,
                        lock.status,
                        lock.attempts
                    );
                }
                true
            }
            Some(lock) => {
                warn!(
                    withdrawal_id = %withdrawal_id,
                    "Not releasing lock now held by {} ({})", lock.admin_name, lock.admin_id
                );
                false
            }
            None => false,
        }
    }

    pub async fn is_locked(&self, withdrawal_id: &str) -> bool {
        self.locks.lock().await.contains_key(withdrawal_id)
    }

    /// Move the lock to `new_status`. Returns whether the change was applied.
    ///
    /// Repeating the current status and leaving `Completed` are ignored.
    pub async fn update_lock_status(
        &self,
        withdrawal_id: &str,
        new_status: LockStatus,
        error_message: Option<&str>,
        tx_hash: Option<&str>,
    ) -> bool {
        let mut locks = self.locks.lock().await;

        let Some(lock) = locks.get_mut(withdrawal_id) else {
            debug!(withdrawal_id = %withdrawal_id, "Status update for unlocked withdrawal ignored");
            return false;
        };

        match lock.status.transition(new_status) {
            Ok(status) => {
                lock.status = status;
                lock.last_update = Instant::now();
                if let Some(message) = error_message {
                    lock.error_message = Some(message.to_string());
                }
                if let Some(hash) = tx_hash {
                    lock.tx_hash = Some(hash.to_string());
                }
                info!(withdrawal_id = %withdrawal_id, "Lock status -> {}", status);
                true
            }
            Err(TransitionError::Unchanged(status)) => {
                info!(
                    withdrawal_id = %withdrawal_id,
                    "Ignoring repeated lock status update to {}", status
                );
                false
            }
            Err(e @ TransitionError::Illegal { .. }) => {
                warn!(withdrawal_id = %withdrawal_id, "Ignoring lock status update: {}", e);
                false
            }
        }
    }

    /// Bump the payout attempt counter; 0 when nothing is locked.
    pub async fn increment_attempts(&self, withdrawal_id: &str) -> u32 {
        let mut locks = self.locks.lock().await;

        match locks.get_mut(withdrawal_id) {
            Some(lock) => {
                lock.attempts += 1;
                lock.attempts
            }
            None => 0,
        }
    }

    pub async fn get_lock_info(&self, withdrawal_id: &str) -> Option<TransactionLock> {
        self.locks.lock().await.get(withdrawal_id).cloned()
    }

    pub async fn get_active_locks(&self) -> HashMap<String, LockSummary> {
        let locks = self.locks.lock().await;
        let now = Instant::now();

        locks
            .iter()
            .map(|(withdrawal_id, lock)| {
                let elapsed = now.saturating_duration_since(lock.start_time);
                (
                    withdrawal_id.clone(),
                    LockSummary {
                        admin_id: lock.admin_id,
                        admin_name: lock.admin_name.clone(),
                        started_at: lock.started_at,
                        duration_secs: elapsed.as_secs(),
                        duration_formatted: format_duration(elapsed),
                        status: lock.status,
                        attempts: lock.attempts,
                    },
                )
            })
            .collect()
    }

    /// Evict every lock older than the timeout. Returns how many were dropped.
    pub async fn cleanup_expired_locks(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        let timeout = self.timeout;
        let before = locks.len();

        locks.retain(|withdrawal_id, lock| {
            let elapsed = now.saturating_duration_since(lock.start_time);
            let expired = elapsed > timeout;
            if expired {
                warn!(
                    withdrawal_id = %withdrawal_id,
                    "Evicting expired lock held by {} for {}",
                    lock.admin_name,
                    format_duration(elapsed)
                );
            }
            !expired
        });

        let evicted = before - locks.len();
        if evicted > 0 {
            info!("Cleaned up {} expired withdrawal locks", evicted);
        }
        evicted
    }
}
