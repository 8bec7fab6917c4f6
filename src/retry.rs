use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Bounded exponential backoff.
///
/// `attempts` is the total number of tries, including the first. The wait
/// before try `k` (1-based, k >= 1) is `base_delay * 2^(k-1)`. No jitter and
/// no cap: the sequence is strictly increasing for a non-zero base.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the failed attempt with the given 0-based index.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Retry an async operation with exponential backoff.
///
/// - `config`: attempt budget and base delay
/// - `shutdown`: a cancelled token cuts a backoff wait short and stops retrying
/// - `classifier`: inspects an error and returns `Retry` or `Abort`
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error if the budget is spent,
/// the classifier returns `Abort`, or shutdown interrupts a backoff wait.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    shutdown: &CancellationToken,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };

        if classifier(&err) == RetryAction::Abort {
            return Err(err);
        }
        if attempt + 1 >= total_attempts {
            return Err(err);
        }

        let delay = config.delay_for_retry(attempt);
        tracing::warn!(
            "Attempt {}/{} failed, retrying in {:.1}s: {}",
            attempt + 1,
            total_attempts,
            delay.as_secs_f64(),
            err
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => {
                tracing::debug!("Shutdown during backoff, giving up");
                return Err(err);
            }
        }
        attempt += 1;
    }
}
