pub mod database;
pub mod memory;
pub mod pool;

pub use database::{
    PgWithdrawalStore, StoreError, Withdrawal, WithdrawalStatus, WithdrawalStatusUpdate,
    WithdrawalStore,
};
pub use memory::MemoryWithdrawalStore;
pub use pool::connect_store;
