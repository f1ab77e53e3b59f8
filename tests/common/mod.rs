#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use std::sync::Arc;
use withdrawal_coordinator::config::LockConfig;
use withdrawal_coordinator::db::{MemoryWithdrawalStore, Withdrawal, WithdrawalStatus};
use withdrawal_coordinator::lock::WithdrawalLockManager;
use withdrawal_coordinator::notify::{Audience, NotifyError, Notifier};
use withdrawal_coordinator::payout::{PayoutError, PayoutExecutor, PayoutRequest, TxId};

mock! {
    pub Executor {}

    #[async_trait]
    impl PayoutExecutor for Executor {
        fn name(&self) -> &'static str;
        async fn pay_out(&self, request: &PayoutRequest) -> Result<TxId, PayoutError>;
    }
}

mock! {
    pub Telegram {}

    #[async_trait]
    impl Notifier for Telegram {
        async fn notify(&self, audience: Audience, text: &str) -> Result<(), NotifyError>;
    }
}

pub fn withdrawal(id: &str, status: WithdrawalStatus) -> Withdrawal {
    let mut withdrawal = Withdrawal::pending(
        id,
        1001,
        "USDT",
        "BSC",
        "0x55d398326f99059fF775485246999027B3197955",
        Decimal::new(12550, 2),
    );
    withdrawal.status = status;
    withdrawal
}

pub async fn store_with(records: &[(&str, WithdrawalStatus)]) -> Arc<MemoryWithdrawalStore> {
    let store = Arc::new(MemoryWithdrawalStore::new());
    for (id, status) in records {
        store.insert(withdrawal(id, *status)).await;
    }
    store
}

pub fn manager(store: Arc<MemoryWithdrawalStore>) -> Arc<WithdrawalLockManager> {
    Arc::new(WithdrawalLockManager::new(store, &LockConfig::default()))
}
