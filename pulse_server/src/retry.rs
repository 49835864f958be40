//! Exponential backoff with jitter for platform and network calls.
//!
//! Rate-limited responses carrying a `Retry-After` hint wait at least that long;
//! other transient failures back off exponentially from `base_delay` up to
//! `max_delay`. Permanent failures are returned immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// How an error wants to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Not retriable.
    Stop,
    /// Retry with the computed backoff.
    Backoff,
    /// Retry no sooner than the given delay.
    After(Duration),
}

pub trait Retryable {
    fn retry_hint(&self) -> RetryHint;
}

impl Retryable for CoreError {
    fn retry_hint(&self) -> RetryHint {
        match self {
            CoreError::RateLimited {
                retry_after: Some(delay),
            } => RetryHint::After(*delay),
            CoreError::RateLimited { retry_after: None } | CoreError::TransientIo(_) => {
                RetryHint::Backoff
            }
            _ => RetryHint::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added on top of a `Retry-After` hint.
    pub retry_after_jitter: Duration,
}

impl RetryConfig {
    /// Platform API calls: base 1s, cap 60s.
    pub const DEFAULT: Self = Self {
        max_attempts: 6,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        retry_after_jitter: Duration::from_secs(1),
    };

    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            retry_after_jitter: base_delay.min(Duration::from_secs(1)),
        }
    }

    /// Ceiling of the exponential delay before the `attempt`-th retry (0-indexed).
    pub fn ceiling_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Equal jitter: half the ceiling is fixed, the other half random.
    pub fn delay_for(&self, attempt: u32, hint: RetryHint) -> Duration {
        match hint {
            RetryHint::Stop => Duration::ZERO,
            RetryHint::After(delay) => delay + random_up_to(self.retry_after_jitter),
            RetryHint::Backoff => {
                let ceiling = self.ceiling_for_attempt(attempt);
                let half = ceiling / 2;
                half + random_up_to(ceiling - half)
            }
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn random_up_to(limit: Duration) -> Duration {
    if limit.is_zero() {
        return Duration::ZERO;
    }
    let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
}

/// Run `operation` until it succeeds, fails permanently, runs out of attempts,
/// or `cancel` fires. Cancellation surfaces as `TransientIo("cancelled")`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display + From<CoreError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let err = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(E::from(CoreError::TransientIo(format!("{label}: cancelled"))));
            }
            result = operation() => match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            },
        };

        attempt += 1;
        let hint = err.retry_hint();
        if hint == RetryHint::Stop || attempt >= config.max_attempts {
            return Err(err);
        }

        let delay = config.delay_for(attempt - 1, hint);
        crate::metrics::retry_scheduled(label);
        tracing::warn!(
            label,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Retrying after error: {err}"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(E::from(CoreError::TransientIo(format!("{label}: cancelled"))));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
