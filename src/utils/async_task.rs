use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::NetworkError;
use crate::Result;

/// Runs `attempt` up to `policy.max_retries` times.
///
/// Each attempt is cut off after `policy.timeout_ms`. Between attempts the
/// delay starts at `policy.base_delay_ms` and doubles, capped at
/// `policy.max_delay_ms`. The error of the last attempt is returned.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    attempt: F,
    policy: BackoffPolicy,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let per_attempt = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut last = NetworkError::TaskBackoffFailed("no attempt was made".to_string());

    for n in 1..=policy.max_retries {
        last = match tokio::time::timeout(per_attempt, attempt()).await {
            Ok(Ok(v)) => return Ok(v),
            Ok(Err(e)) => {
                warn!(attempt = n, error = %e, "attempt failed");
                NetworkError::TaskBackoffFailed(format!("failed with error: {e}"))
            }
            Err(_) => {
                warn!(attempt = n, timeout = ?per_attempt, "attempt timed out");
                NetworkError::RetryTimeoutError(per_attempt)
            }
        };
        if n < policy.max_retries {
            debug!(?delay, "backing off");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }
    Err(last.into())
}

/// Spawns a named background loop, collecting its handle when asked to.
/// A loop that ends with an error is logged.
pub(crate) fn spawn_named<F, Fut>(
    name: &'static str,
    make_loop: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        match make_loop().await {
            Ok(()) => debug!(task = name, "background task finished"),
            Err(e) => error!(task = name, error = ?e, "background task failed"),
        }
    });
    if let Some(handles) = handles {
        handles.push(handle);
    }
}
