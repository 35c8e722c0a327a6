//! Rate limiter metrics regression tests

use super::helpers::*;
use backpressure_ratelimiter::RateLimiter;
use serial_test::serial;

#[test]
#[serial]
fn ratelimiter_metrics_exist() {
    init_recorder();

    let limiter = RateLimiter::builder()
        .capacity(1.0)
        .refill_rate(0.0)
        .name("test_rl")
        .build()
        .unwrap();

    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    assert_counter_exists("ratelimiter_calls_total");
    assert_metric_has_label("ratelimiter_calls_total", "ratelimiter", "test_rl");
    assert_metric_has_label("ratelimiter_calls_total", "result", "permitted");
    assert_metric_has_label("ratelimiter_calls_total", "result", "rejected");

    assert_gauge_exists("ratelimiter_available_tokens");
    assert_metric_has_label("ratelimiter_available_tokens", "ratelimiter", "test_rl");
}
