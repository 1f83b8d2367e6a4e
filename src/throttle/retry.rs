//! Bounded exponential-backoff retry for adapter calls
//!
//! Retries only transient failures (timeouts, network errors). Auth
//! errors, unknown tickers, rate limiting, and parse failures end the
//! adapter attempt immediately; exhausting the budget converts the last
//! error into the attempt's terminal failure.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{ErrorCategory, ErrorClassification};
use crate::source::{SourceError, SourceResult};

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial try (0 disables retrying)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Backoff delay before retry number `retry` (0-based): base delay
    /// doubling each time, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn should_retry(error: &SourceError) -> bool {
        error.category() == ErrorCategory::Transient
    }

    /// Run an operation under this policy.
    ///
    /// The shutdown receiver is observed during backoff sleeps; a signal
    /// aborts the attempt with `SourceError::Cancelled`.
    pub async fn run<T, F, Fut>(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
        mut operation: F,
    ) -> SourceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SourceResult<T>>,
    {
        let mut retry = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !Self::should_retry(&error) || retry >= self.max_retries {
                        if retry > 0 {
                            warn!(retries = retry, %error, "giving up after retries");
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(retry);
                    debug!(retry = retry + 1, ?delay, %error, "retrying after transient failure");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => return Err(SourceError::Cancelled),
                    }

                    retry += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(100),
            Duration::from_millis(400),
        )
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
        assert_eq!(p.delay_for(3), Duration::from_millis(400)); // capped
        assert_eq!(p.delay_for(10), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let (tx, mut rx) = broadcast::channel(1);
        let _keep = tx;

        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let result: SourceResult<&str> = policy(3)
            .run(&mut rx, move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SourceError::Timeout(Duration::from_secs(10)))
                    } else {
                        Ok("fetched")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "fetched");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let (tx, mut rx) = broadcast::channel(1);
        let _keep = tx;

        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let result: SourceResult<()> = policy(2)
            .run(&mut rx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::Unavailable("connection reset".into())) }
            })
            .await;

        assert!(matches!(result, Err(SourceError::Unavailable(_))));
        // 1 initial try + 2 retries
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_auth_or_not_found() {
        let (tx, mut rx) = broadcast::channel(1);
        let _keep = tx;

        for error in [
            SourceError::Auth("bad key".into()),
            SourceError::NotFound("XXXX.JK".into()),
            SourceError::RateLimited("quota".into()),
        ] {
            let count = Arc::new(AtomicU32::new(0));
            let counter = count.clone();
            let failure = error.clone();

            let result: SourceResult<()> = policy(3)
                .run(&mut rx, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let failure = failure.clone();
                    async move { Err(failure) }
                })
                .await;

            assert!(result.is_err());
            assert_eq!(count.load(Ordering::SeqCst), 1, "{error} must not be retried");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_backoff_cancels() {
        let (tx, mut rx) = broadcast::channel(1);

        // The signal is queued before the future is first polled, so the
        // backoff select sees it as soon as the first failure happens.
        let policy = policy(3);
        let run = policy.run(&mut rx, move || async {
            Err::<(), _>(SourceError::Unavailable("flaky".into()))
        });
        tokio::pin!(run);

        // Let the first failure happen and the backoff sleep start.
        tokio::task::yield_now().await;
        tx.send(()).unwrap();

        let result = run.await;
        assert!(matches!(result, Err(SourceError::Cancelled)));
    }
}
