use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

use super::database::{StoreError, Withdrawal, WithdrawalStore, WithdrawalStatusUpdate};

/// In-process store with the same transition guard as the PostgreSQL one.
///
/// Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryWithdrawalStore {
    records: RwLock<HashMap<String, Withdrawal>>,
}

impl MemoryWithdrawalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, withdrawal: Withdrawal) {
        self.records
            .write()
            .await
            .insert(withdrawal.withdrawal_id.clone(), withdrawal);
    }
}

#[async_trait]
impl WithdrawalStore for MemoryWithdrawalStore {
    async fn get_withdrawal(&self, withdrawal_id: &str) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self.records.read().await.get(withdrawal_id).cloned())
    }

    async fn update_withdrawal_status(
        &self,
        withdrawal_id: &str,
        update: WithdrawalStatusUpdate,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;

        let Some(record) = records.get_mut(withdrawal_id) else {
            return Ok(false);
        };

        if !record.status.can_transition_to(update.status) {
            warn!(
                withdrawal_id = %withdrawal_id,
                "Refusing withdrawal status update {} -> {}", record.status, update.status
            );
            return Ok(false);
        }

        record.apply(&update);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::database::WithdrawalStatus;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn completed_record_cannot_fail() {
        let store = MemoryWithdrawalStore::new();
        store
            .insert(Withdrawal::pending("wd-1", 1, "USDT", "BSC", "0xabc", Decimal::ONE))
            .await;

        assert!(store
            .update_withdrawal_status("wd-1", WithdrawalStatusUpdate::completed(9, "0xhash"))
            .await
            .unwrap());
        assert!(!store
            .update_withdrawal_status("wd-1", WithdrawalStatusUpdate::failed(9, "late timeout"))
            .await
            .unwrap());

        let record = store.get_withdrawal("wd-1").await.unwrap().unwrap();
        assert_eq!(record.status, WithdrawalStatus::Completed);
        assert_eq!(record.tx_hash.as_deref(), Some("0xhash"));
    }

    #[tokio::test]
    async fn unknown_withdrawal_is_not_updated() {
        let store = MemoryWithdrawalStore::new();
        let updated = store
            .update_withdrawal_status("missing", WithdrawalStatusUpdate::processing(1))
            .await
            .unwrap();
        assert!(!updated);
    }
}
