//! Retry with exponential backoff for operations whose failures are
//! classified by [`ErrorClass`].

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ErrorClass, MigrateError, Result};

/// Classes retried by [`RetryPolicy::default_retryable`].
pub const TRANSIENT_CLASSES: &[ErrorClass] = &[
    ErrorClass::Timeout,
    ErrorClass::Unavailable,
    ErrorClass::Aborted,
    ErrorClass::ResourceExhausted,
    ErrorClass::Connection,
];

/// Backoff schedule and attempt budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }

    pub fn default_retryable() -> &'static [ErrorClass] {
        TRANSIENT_CLASSES
    }
}

/// Run `op` until it succeeds, fails with a class outside `retryable`, or
/// the attempt budget runs out.
///
/// Non-retryable errors come back unchanged. Exhaustion is reported as
/// [`MigrateError::RetriesExhausted`] wrapping the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    retryable: &[ErrorClass],
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !retryable.contains(&err.class()) {
            return Err(err);
        }
        if attempt >= max_attempts {
            return Err(MigrateError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }
        let delay = policy.backoff(attempt);
        warn!(
            "Retryable error ({:?}), retry {}/{} in {:?}: {}",
            err.class(),
            attempt,
            max_attempts - 1,
            delay,
            err
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = retry_with_backoff(&fast(), TRANSIENT_CLASSES, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(MigrateError::commit(ErrorClass::Aborted, "lock conflict"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returned_unchanged() {
        let calls = AtomicU32::new(0);
        let err = retry_with_backoff(&fast(), &[ErrorClass::Timeout], || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(MigrateError::commit(ErrorClass::Permanent, "bad request"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, MigrateError::Commit { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_distinct() {
        let err = retry_with_backoff(&fast(), TRANSIENT_CLASSES, || async {
            Err::<(), _>(MigrateError::commit(ErrorClass::Unavailable, "down"))
        })
        .await
        .unwrap_err();
        match err {
            MigrateError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.class(), ErrorClass::Unavailable);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
