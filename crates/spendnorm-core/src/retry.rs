//! Retry with exponential back-off and jitter for external calls.
//!
//! Every collaborator call (rate provider, raw feed, warehouse write) goes
//! through [`retry_with_backoff`]. The caller decides which errors are
//! transient; anything else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

/// Back-off schedule shared by all external calls.
///
/// With `base_delay_ms = 1_000`:
///
/// | Retry | Sleep before the attempt      |
/// |-------|-------------------------------|
/// | 1     | 1 000 ms × 2⁰ ± 25 % jitter   |
/// | 2     | 1 000 ms × 2¹ ± 25 % jitter   |
/// | 3     | 1 000 ms × 2² ± 25 % jitter   |
///
/// Delays are capped at `max_delay_ms` before jitter is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Additional attempts after the first; `3` means at most 4 calls.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Self::default()
        }
    }

    /// A policy that never sleeps; used in tests.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> u64 {
        let exp = retry.saturating_sub(1).min(20);
        self.base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retriable error, or
/// exhausts `policy.max_retries` additional attempts.
///
/// `label` names the call in the warning logged before each retry.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    label: &str,
    policy: BackoffPolicy,
    is_retriable: R,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let capped = policy.base_delay(attempt);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    call = label,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    error = %err,
                    "transient error; retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
