//! Load shedder metrics regression tests

use super::helpers::*;
use backpressure_core::{LoadMetrics, Priority};
use backpressure_shedder::LoadShedder;
use serial_test::serial;

#[test]
#[serial]
fn shedder_metrics_exist() {
    init_recorder();

    let shedder = LoadShedder::builder().name("test_shedder").build().unwrap();
    let mut load = LoadMetrics::idle(10, 2);
    load.queue_depth = 6;

    assert!(!shedder.should_admit(Priority::Low, &load));
    assert!(shedder.should_admit(Priority::Critical, &load));

    assert_gauge_exists("shedder_load_score");
    assert_metric_has_label("shedder_load_score", "shedder", "test_shedder");

    assert_counter_exists("shedder_shed_total");
    assert_metric_has_label("shedder_shed_total", "shedder", "test_shedder");
    assert_metric_has_label("shedder_shed_total", "priority", "low");
}
