use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::{Future, FutureExt};

use crate::error::panic_payload;
use crate::{AppError, AppResult};

/// Run a store call, turning a panic (while building or polling the future)
/// into a `RUNTIME/PANIC` error.
pub async fn dispatch_async_app_result<F, Fut, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let outcome = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
        Err(payload) => Err(payload),
    };
    outcome.unwrap_or_else(|payload| {
        let error = AppError::new(AppError::PANIC_CODE, panic_payload(payload.as_ref()));
        tracing::error!(
            target: "quadrant",
            event = "panic_caught",
            message = %error.message()
        );
        Err(error)
    })
}
