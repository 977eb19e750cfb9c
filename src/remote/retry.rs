//! Retry scheduling for remote reads
//!
//! Only idempotent reads are driven through this module; mutations are
//! issued exactly once and surfaced to the caller so a failure never
//! duplicates a side effect. Delays double per retry up to a ceiling, and
//! each one carries a random spread so parallel invocations do not
//! synchronise against the service.

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;
use tracing::{debug, warn};

/// Failures that may clear on their own.
pub trait Transient {
    /// Whether another attempt could plausibly succeed.
    fn is_transient(&self) -> bool;

    /// A wait the server asked for (Retry-After), when it gave one.
    fn mandated_delay(&self) -> Option<Duration> {
        None
    }
}

/// A doubling delay schedule with a ceiling and random spread.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub retries: u32,
    /// Delay before the first retry
    pub base: Duration,
    /// Ceiling for any single delay, computed or server-mandated
    pub cap: Duration,
    /// Fraction of each delay added as random spread; 0.0 disables it
    pub spread: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            spread: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A schedule with no noticeable waits. Used by tests.
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(1),
            spread: 0.0,
        }
    }

    /// Delay before the retry with the given zero-based index: base times
    /// 2^index, capped, plus spread on top.
    pub fn delay_before(&self, retry_index: u32) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let cap_ms = u64::try_from(self.cap.as_millis()).unwrap_or(u64::MAX);

        let doubled = match 1u64.checked_shl(retry_index) {
            Some(factor) => base_ms.saturating_mul(factor),
            None => u64::MAX,
        };
        let capped = doubled.min(cap_ms);

        let spread_ms = (capped as f64 * self.spread * random_unit()) as u64;
        Duration::from_millis(capped.saturating_add(spread_ms))
    }
}

/// Uniform-ish value in [0, 1), drawn from the std hasher's per-instance
/// random seed rather than an extra dependency.
fn random_unit() -> f64 {
    let bits = RandomState::new().build_hasher().finish();
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

/// Drive an idempotent operation through the policy. Non-transient errors
/// return immediately; the final attempt's error is returned as-is.
pub async fn retry_reads<F, Fut, T, E>(
    policy: &RetryPolicy,
    what: &str,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    for retry_index in 0..policy.retries {
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => {
                debug!(what, "Failing without retry: {error}");
                return Err(error);
            }
            Err(error) => error,
        };

        let wait = match error.mandated_delay() {
            Some(mandated) => mandated.min(policy.cap),
            None => policy.delay_before(retry_index),
        };
        warn!(
            what,
            retry = retry_index + 1,
            wait_ms = wait.as_millis() as u64,
            "Transient failure, retrying: {error}"
        );
        tokio::time::sleep(wait).await;
    }

    call().await
}
