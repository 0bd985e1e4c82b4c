//! # Retry Primitive
//!
//! One shared backoff loop parameterized by policy, used by every external
//! call site (store writes, upstream fetches, warehouse chunks, stream
//! reconnects). Keeps the retry semantics in one place instead of scattered
//! ad-hoc loops.

use crate::errors::IngestError;
use crate::ShutdownSignal;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential-backoff retry policy.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum attempts; `None` retries until shutdown.
    pub max_attempts: Option<u32>,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub cap_delay: Duration,
    /// Fractional jitter applied to each delay (0.2 = ±20%).
    pub jitter: f64,
}

impl RetryPolicy {
    /// Store writes: 6 attempts, 1s doubling to a 60s cap, ±20% jitter.
    pub fn sink_transport() -> Self {
        Self {
            max_attempts: Some(6),
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }

    /// Single-block upstream fetch: 3 attempts, short delays.
    pub fn upstream_fetch() -> Self {
        Self {
            max_attempts: Some(3),
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }

    /// Warehouse chunk query: 3 attempts.
    pub fn warehouse_chunk() -> Self {
        Self {
            max_attempts: Some(3),
            base_delay: Duration::from_secs(2),
            cap_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }

    /// Stream reconnect: unbounded attempts, 1s doubling to a 30s cap.
    pub fn stream_reconnect() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }

    /// Delay before attempt `attempt + 1` (attempts count from 1).
    ///
    /// Doubles from `base_delay`, saturates at `cap_delay`, then applies
    /// symmetric jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let raw = self
            .base_delay
            .saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
        let capped = raw.min(self.cap_delay);
        if self.jitter <= 0.0 {
            return capped;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        capped.mul_f64((1.0 + spread).max(0.0))
    }
}

/// Run `operation` under `policy`, sleeping between attempts.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once attempts are exhausted. A shutdown signal observed before an
/// attempt or during a backoff sleep yields [`IngestError::Canceled`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut shutdown: ShutdownSignal,
    operation_name: &str,
    mut operation: F,
) -> Result<T, IngestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IngestError>>,
{
    let mut attempt = 0u32;
    loop {
        if *shutdown.borrow() {
            return Err(IngestError::Canceled);
        }
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        warn!(
                            "{} failed after {} attempts: {}",
                            operation_name, attempt, err
                        );
                        return Err(err);
                    }
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {} failed: {}; retrying in {:?}",
                    operation_name, attempt, err, delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return Err(IngestError::Canceled);
                        }
                    }
                }
            }
        }
    }
}
