use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{debug, warn};

/// Retry policy for transient failures: exponential backoff starting at
/// `initial_backoff`, doubling per attempt, capped at `max_backoff`, with
/// jitter spreading concurrent retries of the same source apart.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay sequence between attempts.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(2.0)
            .with_max_times(self.max_attempts as usize);
        if self.jitter {
            builder = builder.with_jitter();
        }
        builder.build()
    }
}

/// Error surfaced by [`retry_with_backoff`]: either the attempt budget ran
/// out on transient failures, or a non-retriable error stopped the loop.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error(transparent)]
    Permanent(E),
}

/// Run `op` until it succeeds, a non-retriable error occurs, or the
/// attempt budget is spent. On success returns the value together with the
/// number of attempts used.
///
/// The loop runs to exhaustion or success; cancellation is not propagated
/// mid-retry. Timeouts are the operation's own concern, per attempt.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retriable: P,
    mut op: F,
) -> Result<(T, u32), RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delays = policy.backoff();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "succeeded after retry");
                }
                return Ok((value, attempt));
            }
            Err(err) if is_retriable(&err) => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "retriable failure"
                );
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
            }
            Err(err) => return Err(RetryError::Permanent(err)),
        }

        let delay = delays.next().unwrap_or(policy.max_backoff);
        debug!(attempt, wait_ms = delay.as_millis() as u64, "backing off before retry");
        tokio::time::sleep(delay).await;
    }
}
