use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

use super::manager::WithdrawalLockManager;
use crate::config::LockConfig;

/// Periodically evicts locks abandoned by crashed or idle admin sessions,
/// independent of any new acquisition.
pub struct LockSweeper {
    manager: Arc<WithdrawalLockManager>,
    first_delay: Duration,
    period: Duration,
}

impl LockSweeper {
    pub fn new(manager: Arc<WithdrawalLockManager>, config: &LockConfig) -> Self {
        Self {
            manager,
            first_delay: config.cleanup_first_delay(),
            period: config.cleanup_interval(),
        }
    }

    pub async fn run(&self) {
        sleep(self.first_delay).await;

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let evicted = self.manager.cleanup_expired_locks().await;
            if evicted == 0 {
                debug!("Lock sweep found nothing to evict");
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting lock sweeper (every {:?}, first run in {:?})",
                self.period, self.first_delay
            );
            self.run().await;
        })
    }
}
