//! Whole-engine overload stress tests

use backpressure::{CapacityControlConfig, Engine, Priority, TaskContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Test: Producers outrun the workers; low priority absorbs the overload
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_overload_sheds_low_priority_first() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let peak_workers = Arc::new(AtomicUsize::new(0));
    let peak = Arc::clone(&peak_workers);
    let engine = Engine::builder()
        .workers(2, 16)
        .queue_capacity(200)
        .latency_target(Duration::from_millis(50))
        .capacity_control(CapacityControlConfig {
            enabled: true,
            interval: Duration::from_millis(50),
            safety_multiplier: 1.5,
            cooldown: Duration::from_millis(100),
        })
        .on_resize(move |_from: usize, to: usize| {
            peak.fetch_max(to, Ordering::Relaxed);
        })
        .build()
        .unwrap();

    let shed = Arc::new([
        AtomicUsize::new(0),
        AtomicUsize::new(0),
        AtomicUsize::new(0),
        AtomicUsize::new(0),
    ]);
    let mut handles = Vec::new();

    for round in 0..200 {
        for (i, priority) in Priority::ALL.into_iter().enumerate() {
            for _ in 0..5 {
                match engine.submit(priority, |_ctx: TaskContext| async {
                    sleep(Duration::from_millis(20)).await;
                    Ok::<_, ()>(())
                }) {
                    Ok(handle) => handles.push(handle),
                    Err(err) if err.is_shed() => {
                        shed[i].fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => assert!(err.is_queue_full(), "round {round}: {err:?}"),
                }
            }
        }
        sleep(Duration::from_millis(5)).await;
    }

    for handle in handles {
        let _ = handle.await;
    }

    let shed: Vec<usize> = shed.iter().map(|c| c.load(Ordering::Relaxed)).collect();
    let stats = engine.pool_stats();
    let peak_workers = peak_workers.load(Ordering::Relaxed);
    println!(
        "shed per priority {:?}, peak workers {}, completed {}",
        shed, peak_workers, stats.completed
    );

    assert_eq!(shed[3], 0, "critical work was shed");
    assert!(shed[0] >= shed[2], "high priority shed more than low");
    assert!(peak_workers > 2, "controller never scaled up");
    assert_eq!(engine.shed_count() as usize, shed.iter().sum::<usize>());

    engine.shutdown(Duration::from_secs(10)).await.unwrap();
}
