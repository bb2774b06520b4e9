//! Bounded retries for transient AWS failures.
//!
//! SDK clients already retry at the transport level. This layer retries
//! whole operations (credential acquisition, finding imports) that came back
//! throttled, using exponential backoff with jitter and a hard attempt cap.
//! Every other error returns immediately.

use crate::aws::error::AwsError;
use backon::{BackoffBuilder, ExponentialBuilder};
use rolesweep_common::defaults::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_RETRY_MIN_DELAY_MS,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for transient-error retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Initial delay between attempts
    pub min_delay: Duration,
    /// Maximum delay between attempts (cap for exponential growth)
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(DEFAULT_RETRY_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `operation`, retrying while it fails with a retryable error.
///
/// # Returns
/// * `Ok(T)` - The first successful result
/// * `Err` - A non-retryable error, or the last retryable error once the
///   attempt cap is reached
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, AwsError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AwsError>>,
{
    let retries = policy.max_attempts.saturating_sub(1) as usize;
    let mut delays = ExponentialBuilder::default()
        .with_min_delay(policy.min_delay)
        .with_max_delay(policy.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .with_max_times(retries)
        .build();

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => match delays.next() {
                Some(delay) => {
                    debug!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(operation, attempts, "Giving up after transient failures");
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}
