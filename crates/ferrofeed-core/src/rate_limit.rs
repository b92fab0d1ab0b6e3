use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::ValidationError;

/// Token-bucket parameters for one transport client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub requests_per_second: f64,
    /// Bucket capacity. `None` means a capacity of one token.
    pub burst: Option<u32>,
}

impl RateLimit {
    pub const fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            burst: None,
        }
    }

    pub const fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_second(5.0)
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Continuous-refill token bucket shared by all calls of a transport client.
///
/// Cloning shares the underlying bucket.
#[derive(Clone)]
pub struct TokenBucket {
    limiter: Arc<DirectRateLimiter>,
    rate: RateLimit,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

impl TokenBucket {
    pub fn new(rate: RateLimit) -> Result<Self, ValidationError> {
        let quota = quota_from_rate(rate)?;
        Ok(Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            rate,
        })
    }

    /// Waits until one token is available and consumes it.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Consumes a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn rate(&self) -> RateLimit {
        self.rate
    }
}

fn quota_from_rate(rate: RateLimit) -> Result<Quota, ValidationError> {
    if !rate.requests_per_second.is_finite() || rate.requests_per_second <= 0.0 {
        return Err(ValidationError::InvalidRateLimit);
    }

    let burst = NonZeroU32::new(rate.burst.unwrap_or(1)).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (1.0 / rate.requests_per_second).max(0.000_001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .map(|quota| quota.allow_burst(burst))
        .ok_or(ValidationError::InvalidRateLimit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn burst_caps_immediate_tokens() {
        let bucket = TokenBucket::new(RateLimit::per_second(1.0).with_burst(2)).expect("valid");

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn missing_burst_means_single_token() {
        let bucket = TokenBucket::new(RateLimit::per_second(1.0)).expect("valid");

        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(TokenBucket::new(RateLimit::per_second(0.0)).is_err());
        assert!(TokenBucket::new(RateLimit::per_second(f64::NAN)).is_err());
    }

    #[tokio::test]
    async fn acquire_suspends_until_refill() {
        let bucket = TokenBucket::new(RateLimit::per_second(20.0)).expect("valid");
        let started = Instant::now();

        bucket.acquire().await;
        bucket.acquire().await;

        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
