pub mod duration;
pub mod manager;
pub mod status;
pub mod sweeper;

pub use duration::format_duration;
pub use manager::{Acquisition, LockError, LockSummary, TransactionLock, WithdrawalLockManager};
pub use status::{LockStatus, TransitionError};
pub use sweeper::LockSweeper;
