use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{trace, warn};

use super::PayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Exponential backoff: `base_delay * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, PayoutError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PayoutError>>,
{
    let max_retries = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        trace!("{}: attempt {}/{}", label, attempt, max_retries);

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, max_retries, e, delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, 100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(RetryPolicy::new(3, 1_000), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(PayoutError::Rpc("connection reset".into()))
                } else {
                    Ok("0xabc".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "0xabc");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::new(2, 10), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PayoutError::Rpc("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(PayoutError::Rpc(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::new(5, 10), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PayoutError::InvalidAddress("0x12".into())) }
        })
        .await;

        assert!(matches!(result, Err(PayoutError::InvalidAddress(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
