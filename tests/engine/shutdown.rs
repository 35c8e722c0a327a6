use super::quiet_control;
use backpressure::{BackpressureError, Engine, Priority, TaskContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;

#[tokio::test]
async fn shutdown_drains_queued_tasks() {
    let engine = Engine::builder()
        .workers(1, 2)
        .queue_capacity(8)
        .capacity_control(quiet_control())
        .build()
        .unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let ran = Arc::clone(&ran);
            engine
                .submit(Priority::Normal, move |_ctx: TaskContext| async move {
                    sleep(Duration::from_millis(20)).await;
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(i)
                })
                .unwrap()
        })
        .collect();

    engine.shutdown(Duration::from_secs(5)).await.unwrap();

    assert!(engine.is_shutdown());
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await, Ok(i));
    }

    let stats = engine.pool_stats();
    assert_eq!(stats.workers, 0);
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.completed, 3);
}

#[tokio::test]
async fn submissions_after_shutdown_are_refused() {
    let engine = Engine::builder().build().unwrap();
    engine.shutdown(Duration::from_secs(1)).await.unwrap();

    let err = engine
        .submit(Priority::Critical, |_ctx: TaskContext| async { Ok::<_, ()>(()) })
        .unwrap_err();
    assert_eq!(err, BackpressureError::Shutdown);
    assert_eq!(
        engine.shutdown(Duration::from_secs(1)).await,
        Err(BackpressureError::Shutdown)
    );
    // Refused at the door, so the pool never counted it.
    assert_eq!(engine.pool_stats().offered, 0);
}

#[tokio::test]
async fn shutdown_deadline_abandons_queued_tasks() {
    let engine = Engine::builder()
        .workers(1, 1)
        .queue_capacity(8)
        .capacity_control(quiet_control())
        .build()
        .unwrap();

    let (release, wait) = oneshot::channel::<()>();
    let (saw_shutdown_tx, saw_shutdown) = oneshot::channel::<bool>();
    let running = engine
        .submit(Priority::Normal, |ctx: TaskContext| async move {
            ctx.shutdown_token().cancelled().await;
            let _ = saw_shutdown_tx.send(ctx.is_shutting_down());
            let _ = wait.await;
            Ok::<_, ()>("finished")
        })
        .unwrap();
    while engine.pool().busy() == 0 {
        tokio::task::yield_now().await;
    }
    let queued: Vec<_> = (0..2)
        .map(|_| {
            engine
                .submit(Priority::Normal, |_ctx: TaskContext| async { Ok::<_, ()>("queued") })
                .unwrap()
        })
        .collect();

    let result = engine.shutdown(Duration::from_millis(50)).await;
    assert_eq!(result, Err(BackpressureError::DeadlineExceeded));
    assert_eq!(saw_shutdown.await, Ok(true));

    for handle in queued {
        assert_eq!(handle.await, Err(BackpressureError::Shutdown));
    }

    // The running body is left to finish on its own.
    release.send(()).unwrap();
    assert_eq!(running.await, Ok("finished"));
}

#[tokio::test]
async fn dropping_every_clone_stops_the_engine() {
    let engine = Engine::builder()
        .capacity_control(quiet_control())
        .build()
        .unwrap();
    let clone = engine.clone();
    let controller_name = clone.capacity_controller().name().to_string();
    assert_eq!(controller_name, engine.name());

    let handle = clone
        .submit(Priority::Normal, |_ctx: TaskContext| async { Ok::<_, ()>(1) })
        .unwrap();
    assert_eq!(handle.await, Ok(1));

    drop(clone);
    assert!(!engine.is_shutdown());
    drop(engine);
}
