//! Bounded retry with linear backoff
//!
//! Every gateway operation runs as one unit of work through [`with_retry`].
//! Transient failures (`NETWORK`, `TIMEOUT`, `UNKNOWN`) are retried with a
//! linearly growing delay; definitive failures surface immediately.
//!
//! Retries of non-idempotent operations (create/delete/put) may re-execute
//! a remote effect that partially succeeded before the transient failure —
//! callers get at-least-once semantics, not exactly-once.

use crate::error::GatewayResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Default attempt budget per operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay; attempt `n` waits `base * n` before retrying
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one attempt always runs)
    pub max_attempts: u32,

    /// Base delay between attempts, scaled linearly by attempt number
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with an explicit attempt budget and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Execute `operation` with bounded retry and linear backoff
///
/// The operation is invoked up to `policy.max_attempts` times. After a
/// failure, the classified error is returned immediately when the attempt
/// budget is exhausted or the kind is not retryable; otherwise the executor
/// suspends for `base_delay * attempt_number` (holding no locks) and runs
/// the operation again from the start.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !err.is_retryable() {
                    return Err(err);
                }

                let delay = policy.base_delay * attempt;
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = %err.kind,
                    "operation failed, retrying: {}",
                    err
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, GatewayError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn network_error(msg: &str) -> GatewayError {
        GatewayError::with_status(ErrorKind::Network, msg, 0)
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(3), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GatewayError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_attempted_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: GatewayResult<()> = with_retry(&fast_policy(3), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::with_status(ErrorKind::AccessDenied, "denied", 403))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::AccessDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_exhausts_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: GatewayResult<()> = with_retry(&fast_policy(3), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(network_error(&format!("connection lost on attempt {n}")))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Final error is the classification of the last raw failure
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(err.message, "connection lost on attempt 3");
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast_policy(3), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(network_error("flaky"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_linear_backoff_accumulates() {
        // Three attempts wait base*1 + base*2 between them.
        let base = Duration::from_millis(20);
        let policy = RetryPolicy::new(3, base);
        let start = Instant::now();

        let result: GatewayResult<()> = with_retry(&policy, || async {
            Err(network_error("down"))
        })
        .await;

        assert!(result.is_err());
        assert!(start.elapsed() >= base * 3);
    }

    #[tokio::test]
    async fn test_policy_none_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: GatewayResult<()> = with_retry(&RetryPolicy::none(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(network_error("down"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
