//! Circuit breaker metrics regression tests

use super::helpers::*;
use backpressure_circuitbreaker::CircuitBreaker;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn circuitbreaker_metrics_exist() {
    init_recorder();

    let breaker = CircuitBreaker::builder()
        .failure_threshold(2)
        .reset_timeout(Duration::from_secs(60))
        .name("test_cb")
        .build()
        .unwrap();

    let permit = breaker.allow().unwrap();
    breaker.record_success(permit);
    for _ in 0..2 {
        let permit = breaker.allow().unwrap();
        breaker.record_failure(permit);
    }
    assert!(breaker.allow().is_err());

    assert_counter_exists("circuitbreaker_calls_total");
    assert_metric_has_label("circuitbreaker_calls_total", "circuitbreaker", "test_cb");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "success");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "failure");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "rejected");

    assert_counter_exists("circuitbreaker_transitions_total");
    assert_metric_has_label("circuitbreaker_transitions_total", "from", "Closed");
    assert_metric_has_label("circuitbreaker_transitions_total", "to", "Open");

    assert_gauge_exists("circuitbreaker_state");
    assert_metric_has_label("circuitbreaker_state", "circuitbreaker", "test_cb");
}
