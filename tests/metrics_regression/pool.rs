//! Worker pool metrics regression tests

use super::helpers::*;
use backpressure_core::Priority;
use backpressure_pool::{TaskContext, TaskOptions, WorkerPool};
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn pool_metrics_exist() {
    init_recorder();

    let pool = WorkerPool::builder()
        .min_workers(1)
        .max_workers(2)
        .queue_capacity(4)
        .name("test_pool")
        .build()
        .unwrap();

    let ok = pool
        .submit(TaskOptions::new(Priority::Normal), |_ctx: TaskContext| async {
            Ok::<_, &str>(())
        })
        .unwrap();
    ok.await.unwrap();
    let failed = pool
        .submit(TaskOptions::new(Priority::Normal), |_ctx: TaskContext| async {
            Err::<(), _>("boom")
        })
        .unwrap();
    assert!(failed.await.is_err());
    assert_eq!(pool.set_worker_count(2), 2);

    pool.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_counter_exists("pool_tasks_total");
    assert_metric_has_label("pool_tasks_total", "pool", "test_pool");
    assert_metric_has_label("pool_tasks_total", "result", "accepted");
    assert_metric_has_label("pool_tasks_total", "result", "success");
    assert_metric_has_label("pool_tasks_total", "result", "failure");

    assert_gauge_exists("pool_queue_depth");
    assert_gauge_exists("pool_workers");
    assert_gauge_exists("pool_target_workers");
    assert_metric_has_label("pool_target_workers", "pool", "test_pool");

    assert_histogram_exists("pool_task_duration_seconds");
    assert_metric_has_label("pool_task_duration_seconds", "pool", "test_pool");
}
