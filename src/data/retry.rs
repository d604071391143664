use std::time::Duration;
use tokio_retry::{strategy::{jitter, ExponentialBackoff}, Retry};

use crate::errors::DeskResult;

/// Retry transient provider failures with jittered exponential backoff.
/// Non-retryable errors are returned on the first attempt.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, max_retries: usize) -> DeskResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DeskResult<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_retries);

    let operation = &operation;
    Retry::spawn(retry_strategy, move || async move {
        match operation().await {
            Ok(result) => Ok(Ok(result)),
            Err(e) if e.is_retryable() => {
                tracing::warn!("Retryable provider error: {}", e);
                if let Some(wait) = e.retry_delay() {
                    tracing::warn!("Waiting {}s before retrying", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
                Err(e)
            }
            Err(e) => {
                tracing::error!("Non-retryable provider error: {}", e);
                // Permanent failures end the loop on the first attempt
                Ok(Err(e))
            }
        }
    })
    .await
    .and_then(|result| result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeskError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_with_backoff(
            move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DeskError::Timeout { timeout_seconds: 1 })
                } else {
                    Ok(42)
                }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_stop_immediately() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: DeskResult<()> = retry_with_backoff(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DeskError::provider("Invalid API call"))
            },
            3,
        )
        .await;

        assert!(matches!(result, Err(DeskError::Provider { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_waits_then_retries() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_with_backoff(
            move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DeskError::RateLimit { retry_after: 0 })
                } else {
                    Ok("fed")
                }
            },
            2,
        )
        .await;

        assert_eq!(result.unwrap(), "fed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: DeskResult<()> = retry_with_backoff(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DeskError::Cancelled)
            },
            3,
        )
        .await;

        assert!(matches!(result, Err(DeskError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
