//! Property tests for the token bucket.
//!
//! Invariants tested:
//! - A fresh bucket admits exactly its capacity in a burst
//! - Over any run, admissions never exceed capacity + rate * elapsed
//! - Available tokens stay within `0..=capacity`

use backpressure_core::ManualClock;
use backpressure_ratelimiter::RateLimiter;
use proptest::prelude::*;
use std::time::Duration;

fn limiter(clock: &ManualClock, capacity: u32, rate: f64) -> RateLimiter {
    RateLimiter::builder()
        .capacity(capacity as f64)
        .refill_rate(rate)
        .clock(clock.shared())
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the first burst is exactly the capacity
    #[test]
    fn burst_equals_capacity(
        capacity in 1u32..=100,
        rate in 0.0f64..=50.0,
        attempts in 0u32..=50,
    ) {
        let clock = ManualClock::new();
        let limiter = limiter(&clock, capacity, rate);

        let admitted = (0..capacity + attempts)
            .filter(|_| limiter.try_acquire())
            .count();
        prop_assert_eq!(admitted, capacity as usize);
    }

    /// Property: admissions are bounded by capacity plus refill
    #[test]
    fn admissions_bounded_by_refill(
        capacity in 1u32..=20,
        rate in 0.5f64..=20.0,
        steps in prop::collection::vec((0u64..=250, 0u32..=10), 1..=40),
    ) {
        let clock = ManualClock::new();
        let limiter = limiter(&clock, capacity, rate);
        let mut elapsed = Duration::ZERO;
        let mut admitted = 0u64;

        for (advance_ms, attempts) in steps {
            let step = Duration::from_millis(advance_ms);
            clock.advance(step);
            elapsed += step;

            for _ in 0..attempts {
                if limiter.try_acquire() {
                    admitted += 1;
                }
            }

            let bound = capacity as f64 + rate * elapsed.as_secs_f64();
            prop_assert!(
                admitted as f64 <= bound + 1e-6,
                "admitted {} after {:?}, bound {}",
                admitted,
                elapsed,
                bound
            );

            let available = limiter.available_tokens();
            prop_assert!((0.0..=capacity as f64).contains(&available));
        }
    }

    /// Property: a rejection reports when the next token is due
    #[test]
    fn retry_after_is_accurate(
        capacity in 1u32..=10,
        rate in 0.5f64..=20.0,
    ) {
        let clock = ManualClock::new();
        let limiter = limiter(&clock, capacity, rate);
        for _ in 0..capacity {
            prop_assert!(limiter.try_acquire());
        }

        let retry_after = match limiter.check() {
            Err(backpressure_ratelimiter::RateLimiterError::RateLimitExceeded { retry_after }) => retry_after,
            Ok(()) => return Err(TestCaseError::fail("empty bucket admitted a call")),
        };
        let retry_after = retry_after.expect("a refilling bucket reports a delay");

        // Waiting the reported delay (rounded up) is always enough.
        clock.advance(retry_after + Duration::from_micros(1));
        prop_assert!(limiter.try_acquire());
    }
}
