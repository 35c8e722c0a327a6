use super::quiet_control;
use backpressure::{Engine, Priority, TaskContext, TaskOutcome};
use backpressure_capacity::CapacityEvent;
use backpressure_circuitbreaker::CircuitState;
use backpressure_core::{BackpressureEvent, EventListeners, FnListener, ManualClock};
use backpressure_pool::PoolEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn builder_callbacks_see_task_lifecycle() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let shed = Arc::new(AtomicUsize::new(0));

    let f = Arc::clone(&finished);
    let r = Arc::clone(&rejected);
    let s = Arc::clone(&shed);
    let engine = Engine::builder()
        .workers(1, 1)
        .rate_limit(2.0, 0.0)
        .shed_threshold(Priority::Low, Some(0.0))
        .capacity_control(quiet_control())
        .on_task_finished(move |outcome: TaskOutcome, _duration: Duration| {
            f.lock().unwrap().push(outcome);
        })
        .on_task_rejected(move |priority: Priority, reason: &'static str| {
            r.lock().unwrap().push((priority, reason));
        })
        .on_shed(move |priority: Priority, _score: f64| {
            assert_eq!(priority, Priority::Low);
            s.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let ok = engine
        .submit(Priority::Normal, |_ctx: TaskContext| async { Ok::<_, &str>(()) })
        .unwrap();
    assert_eq!(ok.await, Ok(()));
    let failed = engine
        .submit(Priority::Normal, |_ctx: TaskContext| async { Err::<(), _>("nope") })
        .unwrap();
    assert!(failed.await.unwrap_err().is_application());

    // The bucket is empty now and never refills.
    let limited = engine
        .submit(Priority::High, |_ctx: TaskContext| async { Ok::<_, &str>(()) })
        .unwrap();
    assert!(limited.await.unwrap_err().is_rate_limited());

    assert!(engine
        .submit(Priority::Low, |_ctx: TaskContext| async { Ok::<_, &str>(()) })
        .unwrap_err()
        .is_shed());

    engine.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(
        *finished.lock().unwrap(),
        vec![TaskOutcome::Success, TaskOutcome::Failure]
    );
    assert_eq!(
        *rejected.lock().unwrap(),
        vec![(Priority::High, "rate_limited")]
    );
    assert_eq!(shed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capacity_resizes_reach_both_listener_sets() {
    let clock = ManualClock::new();
    let pool_resizes = Arc::new(Mutex::new(Vec::new()));
    let controller_events = Arc::new(Mutex::new(Vec::new()));

    let p = Arc::clone(&pool_resizes);
    let c = Arc::clone(&controller_events);
    let mut capacity = EventListeners::new();
    capacity.add(FnListener::new(move |event: &CapacityEvent| match event {
        CapacityEvent::Resized { from, to, .. } => {
            c.lock().unwrap().push(format!("resized {from}->{to}"));
        }
        CapacityEvent::ResizeSuppressed { desired, .. } => {
            c.lock().unwrap().push(format!("suppressed {desired}"));
        }
        CapacityEvent::Sampled { .. } => {}
    }));

    let engine = Engine::builder()
        .workers(1, 8)
        .clock(clock.shared())
        .capacity_control(quiet_control())
        .on_resize(move |from: usize, to: usize| {
            p.lock().unwrap().push((from, to));
        })
        .capacity_listeners(capacity)
        .build()
        .unwrap();
    let controller = engine.capacity_controller();
    let cooldown = controller.cooldown();

    // 10/s at 200ms with 1.5x headroom asks for three workers.
    assert_eq!(controller.tick(10.0, Duration::from_millis(200)), Some(3));
    assert_eq!(engine.pool_stats().target_workers, 3);

    // Within the cooldown the next change is held back.
    assert_eq!(controller.tick(30.0, Duration::from_millis(200)), None);
    assert_eq!(engine.pool_stats().target_workers, 3);

    clock.advance(cooldown);
    assert_eq!(controller.tick(30.0, Duration::from_millis(200)), Some(8));

    assert_eq!(*pool_resizes.lock().unwrap(), vec![(1, 3), (3, 8)]);
    assert_eq!(
        *controller_events.lock().unwrap(),
        vec!["resized 1->3", "suppressed 8", "resized 3->8"]
    );

    engine.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn breaker_transitions_are_reported_in_order() {
    let clock = ManualClock::new();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);

    let engine = Engine::builder()
        .workers(1, 1)
        .clock(clock.shared())
        .circuit_breaker(1, Duration::from_secs(2))
        .capacity_control(quiet_control())
        .on_circuit_transition(move |from: CircuitState, to: CircuitState| {
            t.lock().unwrap().push((from, to));
        })
        .build()
        .unwrap();

    let failing = engine
        .submit_guarded(Priority::Normal, |_ctx: TaskContext| async { Err::<(), _>("down") })
        .unwrap();
    assert!(failing.await.unwrap_err().is_application());

    clock.advance(Duration::from_secs(2));
    let failing_trial = engine
        .submit_guarded(Priority::Normal, |_ctx: TaskContext| async { Err::<(), _>("still down") })
        .unwrap();
    assert!(failing_trial.await.unwrap_err().is_application());

    let rejected = engine
        .submit_guarded(Priority::Normal, |_ctx: TaskContext| async { Ok::<_, &str>(()) })
        .unwrap();
    assert!(rejected.await.unwrap_err().is_circuit_open());

    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Open),
        ]
    );

    engine.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn priority_listeners_only_see_their_tasks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let mut pool = EventListeners::new();
    pool.add_for_priority(
        Priority::High,
        FnListener::new(move |event: &PoolEvent| {
            s.lock().unwrap().push((event.event_type(), event.priority()));
        }),
    );

    let engine = Engine::builder()
        .workers(1, 2)
        .capacity_control(quiet_control())
        .pool_listeners(pool)
        .build()
        .unwrap();

    for priority in [Priority::Low, Priority::High, Priority::Normal] {
        let handle = engine
            .submit(priority, |_ctx: TaskContext| async { Ok::<_, ()>(()) })
            .unwrap();
        handle.await.unwrap();
    }
    engine.set_worker_count(2);
    engine.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("task_accepted", Some(Priority::High)),
            ("task_finished", Some(Priority::High)),
        ]
    );
}
