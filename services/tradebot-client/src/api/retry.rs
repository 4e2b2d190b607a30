//! Bounded exponential backoff around remote calls

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::result::ApiResult;

/// Retry configuration for API calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000, // 1 second
            max_delay_ms: 10000, // 10 seconds
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (0-indexed): 1s, 2s, 4s ... capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Run `operation` until it succeeds, fails terminally, or attempts run out.
///
/// Returns the last observed result when every attempt was retryable.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let result = operation().await;

        if !result.is_retryable() {
            return result;
        }
        if attempt + 1 >= max_attempts {
            warn!(
                "Request failed after {} attempts (code {:?})",
                max_attempts,
                result.code()
            );
            return result;
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            "Request failed (attempt {}/{}, code {:?}), retrying in {:?}",
            attempt + 1,
            max_attempts,
            result.code(),
            delay
        );
        sleep(delay).await;
        debug!("Retrying request");
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_500_uses_every_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: ApiResult<()> = retry(&RetryPolicy::default(), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                ApiResult::error(500 + n as u16, "server error")
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3100), "elapsed {:?}", elapsed);
        assert_eq!(result.code(), Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: ApiResult<()> = retry(&RetryPolicy::default(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                ApiResult::error(404, "not found")
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(result.code(), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_network_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry(&RetryPolicy::default(), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    ApiResult::error(0, "connection reset")
                } else {
                    ApiResult::Success("ok")
                }
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.into_result().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };

        let _: ApiResult<()> = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                ApiResult::error(503, "unavailable")
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
