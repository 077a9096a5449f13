//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::core::error::LauncherResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> LauncherResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LauncherResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, self.attempts, e
                    );
                    tokio::time::sleep(self.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LauncherError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_only_retryable_errors() {
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let calls = AtomicU32::new(0);
        let result: LauncherResult<()> = policy
            .run("manifest", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LauncherError::ManifestUnavailable("reset".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let result: LauncherResult<()> = policy
            .run("manifest", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LauncherError::ManifestMalformed("eof".into()))
            })
            .await;
        assert!(matches!(result, Err(LauncherError::ManifestMalformed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let value = policy
            .run("descriptor", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(LauncherError::TransportFailure {
                        url: "u".into(),
                        reason: "timeout".into(),
                    })
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    }
}
