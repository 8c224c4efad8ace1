//! Token bucket admission control for outbound lookups.
//!
//! Refill is lazy: the clock is only read when a consume call would
//! otherwise be denied, so there is no background timer.

use crate::cancel::CancelToken;
use crate::error::{GeotagError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source and sleeper. Injected so tests can run without wall-clock waits.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `duration`, returning `Cancelled` early if `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
        cancel.wait(duration)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
        (**self).sleep(duration, cancel)
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;


/// A self-refilling rate limiter.
///
/// `capacity` and `rate` are fixed at construction; only `consume` mutates
/// the token count and refill timestamp.
#[derive(Debug)]
pub struct TokenBucket<C: Clock = SystemClock> {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_refill: Instant,
    clock: C,
}

impl<C: Clock> TokenBucket<C> {
    /// A full bucket.
    pub fn new(capacity: f64, rate: f64, clock: C) -> Result<Self> {
        Self::with_tokens(capacity, rate, capacity, clock)
    }

    /// A bucket seeded with `tokens`, anywhere from empty up to `capacity`.
    pub fn with_tokens(capacity: f64, rate: f64, tokens: f64, clock: C) -> Result<Self> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(GeotagError::InvalidConfig(format!("bucket capacity must be positive, got {}", capacity)));
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(GeotagError::InvalidConfig(format!("refill rate must be positive, got {}", rate)));
        }
        if !(tokens.is_finite() && tokens >= 0.0) {
            return Err(GeotagError::InvalidConfig(format!("initial tokens must be non-negative, got {}", tokens)));
        }
        if tokens > capacity {
            return Err(GeotagError::InvalidConfig(format!(
                "initial tokens ({}) exceed bucket capacity ({})",
                tokens, capacity
            )));
        }

        let last_refill = clock.now();
        Ok(Self {
            capacity,
            rate,
            tokens,
            last_refill,
            clock,
        })
    }

    /// Take `cost` tokens if available and return `Duration::ZERO`.
    ///
    /// Otherwise leave the count untouched and return how long the caller
    /// has to wait for enough tokens to accumulate.
    pub fn consume(&mut self, cost: f64) -> Duration {
        if self.tokens < cost {
            let now = self.clock.now();
            let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            self.last_refill = now;

            if self.tokens < cost {
                // Round up to whole nanoseconds so sleeping exactly this long always suffices.
                let nanos = ((cost - self.tokens) / self.rate * 1e9).ceil();
                return Duration::from_nanos(nanos as u64);
            }
        }

        self.tokens -= cost;
        Duration::ZERO
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn manual_bucket(capacity: f64, rate: f64) -> (TokenBucket<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let bucket = TokenBucket::new(capacity, rate, clock.clone()).unwrap();
        (bucket, clock)
    }

    #[test]
    fn test_full_bucket_admits_capacity_then_throttles() {
        let (mut bucket, _clock) = manual_bucket(10.0, 1.0);

        for _ in 0..10 {
            assert_eq!(bucket.consume(1.0), Duration::ZERO);
        }
        let wait = bucket.consume(1.0);
        assert!(wait > Duration::ZERO);
        assert_abs_diff_eq!(wait.as_secs_f64(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wait_then_admit() {
        let (mut bucket, clock) = manual_bucket(2.0, 4.0);
        bucket.consume(1.0);
        bucket.consume(1.0);

        let wait = bucket.consume(1.0);
        assert_abs_diff_eq!(wait.as_secs_f64(), 0.25, epsilon = 1e-9);

        clock.advance(wait);
        assert_eq!(bucket.consume(1.0), Duration::ZERO);
    }

    #[test]
    fn test_wait_is_sufficient_for_awkward_rates() {
        let (mut bucket, clock) = manual_bucket(1.0, 3.0);
        bucket.consume(1.0);

        let wait = bucket.consume(1.0);
        clock.advance(wait);
        assert_eq!(bucket.consume(1.0), Duration::ZERO);
    }

    #[test]
    fn test_denied_consume_does_not_deduct() {
        let clock = Arc::new(ManualClock::new());
        let mut bucket = TokenBucket::with_tokens(10.0, 2.0, 0.5, clock.clone()).unwrap();

        let wait = bucket.consume(1.0);
        assert_abs_diff_eq!(wait.as_secs_f64(), 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(bucket.tokens(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let (mut bucket, clock) = manual_bucket(3.0, 1.0);
        for _ in 0..3 {
            bucket.consume(1.0);
        }
        clock.advance(Duration::from_secs(3600));

        for _ in 0..3 {
            assert_eq!(bucket.consume(1.0), Duration::ZERO);
        }
        assert!(bucket.consume(1.0) > Duration::ZERO);
    }

    #[test]
    fn test_no_refill_while_tokens_plentiful() {
        let clock = Arc::new(ManualClock::new());
        let mut bucket = TokenBucket::with_tokens(10.0, 1.0, 5.0, clock.clone()).unwrap();

        clock.advance(Duration::from_secs(100));
        bucket.consume(1.0);
        // The elapsed 100s were not credited because no refill was needed.
        assert_abs_diff_eq!(bucket.tokens(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_seeded_near_empty_throttles_second_call() {
        let clock = Arc::new(ManualClock::new());
        let mut bucket = TokenBucket::with_tokens(10.0, 1.0, 1.0, clock).unwrap();
        assert_eq!(bucket.consume(1.0), Duration::ZERO);
        assert!(bucket.consume(1.0) > Duration::ZERO);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TokenBucket::new(0.0, 1.0, SystemClock).is_err());
        assert!(TokenBucket::new(10.0, 0.0, SystemClock).is_err());
        assert!(TokenBucket::new(10.0, f64::NAN, SystemClock).is_err());
        assert!(TokenBucket::with_tokens(10.0, 1.0, -1.0, SystemClock).is_err());
    }

    #[test]
    fn test_seed_above_capacity_rejected() {
        let result = TokenBucket::with_tokens(10.0, 1.0, 50.0, ManualClock::new());
        assert!(matches!(result, Err(GeotagError::InvalidConfig(_))));

        let mut bucket = TokenBucket::with_tokens(10.0, 1.0, 10.0, ManualClock::new()).unwrap();
        let admitted = (0..50).take_while(|_| bucket.consume(1.0).is_zero()).count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(1500), &CancelToken::new()).unwrap();
        assert_eq!(clock.now() - start, Duration::from_millis(1500));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
    }

    #[test]
    fn test_manual_clock_sleep_cancelled() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(clock.sleep(Duration::from_secs(1), &cancel), Err(GeotagError::Cancelled)));
        assert!(clock.sleeps().is_empty());
    }
}
