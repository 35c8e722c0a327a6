//! Worker pool stress tests

use backpressure::{Engine, Priority, TaskContext};
use backpressure_pool::{TaskOptions, WorkerPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::ConcurrencyTracker;

/// Test: Hundreds of thousands of trivial tasks through a small pool
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_high_volume() {
    let pool = Arc::new(
        WorkerPool::builder()
            .min_workers(8)
            .max_workers(8)
            .queue_capacity(10_000)
            .build()
            .unwrap(),
    );
    let total = 200_000usize;
    let done = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut submitted = 0;
    let mut handles = Vec::with_capacity(10_000);
    while submitted < total {
        let d = Arc::clone(&done);
        match pool.submit(TaskOptions::new(Priority::Normal), move |_ctx: TaskContext| async move {
            d.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ()>(())
        }) {
            Ok(handle) => {
                handles.push(handle);
                submitted += 1;
            }
            Err(err) => {
                assert!(err.is_queue_full());
                for handle in handles.drain(..) {
                    handle.await.unwrap();
                }
            }
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let elapsed = start.elapsed();
    println!(
        "{} tasks in {:?} ({:.0} tasks/s)",
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64()
    );

    pool.shutdown(Duration::from_secs(10)).await.unwrap();
    let stats = pool.stats();
    assert_eq!(done.load(Ordering::Relaxed), total);
    assert_eq!(stats.completed, total as u64);
    assert_eq!(stats.in_flight, 0);
}

/// Test: Concurrency stays bounded while the pool is resized under load
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_resize_under_load() {
    let engine = Engine::builder()
        .workers(2, 32)
        .max_concurrency(16)
        .queue_capacity(4_096)
        .build()
        .unwrap();
    let tracker = ConcurrencyTracker::new();

    let resizer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                engine.set_worker_count(2 + (i * 7) % 31);
                sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let mut handles = Vec::new();
    for _ in 0..4_000 {
        let tracker = Arc::clone(&tracker);
        let handle = engine
            .submit(Priority::Critical, move |_ctx: TaskContext| async move {
                tracker.enter();
                sleep(Duration::from_micros(200)).await;
                tracker.exit();
                Ok::<_, ()>(())
            })
            .unwrap();
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }
    resizer.await.unwrap();

    println!("peak concurrency: {}", tracker.peak());
    assert!(tracker.peak() <= 16);

    engine.shutdown(Duration::from_secs(10)).await.unwrap();
    let stats = engine.pool_stats();
    assert_eq!(stats.workers, 0);
    assert_eq!(stats.completed, 4_000);
}
