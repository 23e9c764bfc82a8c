use std::future::Future;

use tracing::warn;

use crate::config::SyncConfig;
use crate::store::{RemoteOp, ERR_TIMEOUT};
use crate::util::dispatch_async_app_result;
use crate::{AppError, AppResult};

/// Run one remote call under the configured timeout and bounded backoff.
///
/// Panics raised by the store are converted into errors and not retried.
pub(crate) async fn call_remote<T, F, Fut>(
    config: &SyncConfig,
    op: RemoteOp,
    table: &str,
    mut call: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = config.retry.max_attempts.max(1);
    let timeout = config.remote_timeout();
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, dispatch_async_app_result(&mut call)).await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::new(ERR_TIMEOUT, "remote call timed out")
                .with_context("timeout_ms", config.remote_timeout_ms.to_string())),
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let err = err
            .with_context("operation", op.as_str())
            .with_context("table", table)
            .with_context("attempt", attempt.to_string());
        if err.code() == AppError::PANIC_CODE || attempt >= attempts {
            return Err(err);
        }
        let delay = config.retry.delay_after(attempt);
        warn!(
            target: "quadrant",
            event = "remote_retry",
            operation = %op,
            table = %table,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config(attempts: u32, timeout_ms: u64) -> SyncConfig {
        SyncConfig {
            remote_timeout_ms: timeout_ms,
            retry: RetryPolicy {
                max_attempts: attempts,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = call_remote(&config(3, 1_000), RemoteOp::Select, "tasks", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::new("STORE/OFFLINE", "offline"))
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
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = call_remote(&config(2, 1_000), RemoteOp::Insert, "tasks", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), AppError>(AppError::new("STORE/OFFLINE", "offline"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.context().get("operation").map(String::as_str), Some("insert"));
        assert_eq!(err.context().get("attempt").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let err = call_remote(&config(1, 20), RemoteOp::Select, "tasks", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), AppError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ERR_TIMEOUT);
    }

    #[tokio::test]
    async fn panics_are_fenced_and_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = call_remote(&config(3, 1_000), RemoteOp::Delete, "tasks", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if calls.load(Ordering::SeqCst) > 0 {
                panic!("driver bug");
            }
            Ok::<(), AppError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), AppError::PANIC_CODE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
