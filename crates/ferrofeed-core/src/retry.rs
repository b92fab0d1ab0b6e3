//! Retry policy with exponential backoff and optional jitter.

use std::time::Duration;

use crate::transport::TransportError;

/// Delay schedule between attempts of one logical request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `min(base * factor^n, max)` for the n-th retry (0-based), optionally
    /// spread by up to half the delay in either direction.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(1_000),
            factor: 2.0,
            max: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl Backoff {
    pub fn exponential(base: Duration, factor: f64, max: Duration) -> Self {
        Self::Exponential {
            base,
            factor,
            max,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt`, counted from zero.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };

                let mut delay = Duration::from_secs_f64(capped_seconds.max(0.0));

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Retry configuration of one transport client.
///
/// Total attempts for a persistently failing retryable call are
/// `max_retries + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
    /// HTTP statuses eligible for retry. Errors without a status (network
    /// failures) are governed by their classification alone.
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![401, 403, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, base: Duration, factor: f64, max: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::exponential(base, factor, max),
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// Whether `error` may be retried after `retry_count` retries so far.
    pub fn should_retry(&self, error: &TransportError, retry_count: u32) -> bool {
        if retry_count >= self.max_retries || !error.retryable() {
            return false;
        }

        error
            .status()
            .map_or(true, |status| self.should_retry_status(status))
    }

    /// Delay before the `retry_count`-th retry (1-based).
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        self.backoff.delay(retry_count.saturating_sub(1))
    }
}
