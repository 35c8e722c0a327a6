//! Capacity controller metrics regression tests

use super::helpers::*;
use backpressure::{CapacityControlConfig, Engine, Priority, TaskContext};
use backpressure_core::ManualClock;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn capacity_metrics_exist() {
    init_recorder();

    let clock = ManualClock::new();
    let engine = Engine::builder()
        .name("test_capacity")
        .workers(1, 4)
        .clock(clock.shared())
        .capacity_control(CapacityControlConfig {
            interval: Duration::from_secs(3600),
            ..CapacityControlConfig::default()
        })
        .build()
        .unwrap();

    let handle = engine
        .submit(Priority::Normal, |_ctx: TaskContext| async { Ok::<_, ()>(()) })
        .unwrap();
    handle.await.unwrap();

    clock.advance(Duration::from_secs(1));
    engine.refresh_stats();
    assert_eq!(
        engine.capacity_controller().tick(20.0, Duration::from_millis(100)),
        Some(3)
    );

    assert_gauge_exists("capacity_arrival_rate");
    assert_metric_has_label("capacity_arrival_rate", "controller", "test_capacity");
    assert_gauge_exists("capacity_rejection_rate");
    assert_gauge_exists("capacity_worker_utilization");

    assert_counter_exists("capacity_resizes_total");
    assert_metric_has_label("capacity_resizes_total", "direction", "up");
    assert_gauge_exists("capacity_target_workers");

    engine.shutdown(Duration::from_secs(1)).await.unwrap();
}
