//! Automatic retry with error recovery guidance

use crate::error::{ErrorRecovery, Result};
use futures::future::BoxFuture;

/// Retry an operation, backing off the way the failing error asks
///
/// The operation runs again only while the error is retriable, a backoff
/// strategy is defined, and fewer than `max_attempts` attempts have been made
/// (`None` means a single attempt).
pub async fn retry_with_recovery<'a, T: 'a>(
    mut operation: impl FnMut() -> BoxFuture<'a, Result<T>> + Send + 'a,
    max_attempts: Option<u32>,
) -> Result<T> {
    let max_attempts = max_attempts.unwrap_or(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retriable() || attempt >= max_attempts {
                    return Err(err);
                }

                let Some(delay) = err.backoff_strategy().delay_for_attempt(attempt) else {
                    return Err(err);
                };

                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    action = err.suggested_action(),
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
