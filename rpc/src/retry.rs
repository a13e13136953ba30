//! Bounded fixed-delay retry for peer calls.

use std::future::Future;
use std::time::Duration;

/// How many times to attempt a call and how long to wait between attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so `attempts = 1` means no retry).
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

/// Run `op` until it succeeds or the attempt budget is exhausted.
///
/// Only `Err` outcomes are retried; logical rejections must be expressed as
/// `Ok` values by the caller so they are never retried here.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.delay).await;
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "call attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}
