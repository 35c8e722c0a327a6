//! Circuit breaker stress tests

use backpressure_circuitbreaker::{CircuitBreaker, CircuitState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Test: Millions of permits across threads while the circuit flaps
#[test]
#[ignore]
fn stress_flapping_circuit() {
    let breaker = CircuitBreaker::builder()
        .failure_threshold(5)
        .reset_timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    let permitted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let breaker = breaker.clone();
            let permitted = Arc::clone(&permitted);
            let rejected = Arc::clone(&rejected);
            std::thread::spawn(move || {
                for i in 0..250_000usize {
                    match breaker.allow() {
                        Ok(permit) => {
                            permitted.fetch_add(1, Ordering::Relaxed);
                            if (i + t) % 3 == 0 {
                                breaker.record_failure(permit);
                            } else {
                                breaker.record_success(permit);
                            }
                        }
                        Err(_) => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let permitted = permitted.load(Ordering::Relaxed);
    let rejected = rejected.load(Ordering::Relaxed);
    println!(
        "{} permitted, {} rejected in {:?}, {} transitions",
        permitted,
        rejected,
        start.elapsed(),
        breaker.metrics().generation
    );
    assert_eq!(permitted + rejected, 2_000_000);
}

/// Test: Only one trial per half-open episode, across many episodes
#[test]
#[ignore]
fn stress_half_open_trials() {
    let breaker = CircuitBreaker::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(1))
        .build()
        .unwrap();

    for _ in 0..1_000 {
        let permit = breaker.allow().unwrap();
        breaker.record_failure(permit);
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(1));

        let trials = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let breaker = breaker.clone();
                let trials = Arc::clone(&trials);
                std::thread::spawn(move || {
                    if let Ok(permit) = breaker.allow() {
                        trials.fetch_add(1, Ordering::SeqCst);
                        breaker.record_success(permit);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        // The trial closes the circuit, after which later callers pass too.
        assert!(trials.load(Ordering::SeqCst) >= 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
