//! Admission controller metrics regression tests

use super::helpers::*;
use backpressure_pool::AdmissionController;
use backpressure_ratelimiter::RateLimiter;
use serial_test::serial;

#[test]
#[serial]
fn admission_metrics_exist() {
    init_recorder();

    let admission = AdmissionController::builder()
        .max_concurrency(1)
        .rate_limiter(
            RateLimiter::builder()
                .capacity(1.0)
                .refill_rate(0.0)
                .build()
                .unwrap(),
        )
        .name("test_admission")
        .build()
        .unwrap();

    let mut ticket = admission.try_acquire().unwrap();
    assert!(admission.try_acquire().is_err());
    ticket.release().unwrap();
    assert!(ticket.release().is_err());

    assert_gauge_exists("admission_in_flight");
    assert_metric_has_label("admission_in_flight", "admission", "test_admission");

    assert_counter_exists("admission_rejections_total");
    assert_metric_has_label("admission_rejections_total", "reason", "rate_limited");

    assert_counter_exists("admission_double_release_total");
    assert_metric_has_label(
        "admission_double_release_total",
        "admission",
        "test_admission",
    );
}
