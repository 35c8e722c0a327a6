//! Rate limiter stress tests

use backpressure_ratelimiter::RateLimiter;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Test: Contended bucket never admits more than capacity plus refill
#[test]
#[ignore]
fn stress_contended_bucket() {
    let capacity = 100.0;
    let rate = 1_000.0;
    let limiter = Arc::new(
        RateLimiter::builder()
            .capacity(capacity)
            .refill_rate(rate)
            .build()
            .unwrap(),
    );
    let admitted = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let run_for = Duration::from_millis(500);

    let threads: Vec<_> = (0..16)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                while start.elapsed() < run_for {
                    if limiter.try_acquire() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let elapsed = start.elapsed();
    let admitted = admitted.load(Ordering::Relaxed);
    let bound = capacity + rate * elapsed.as_secs_f64();
    println!("admitted {} in {:?} (bound {:.0})", admitted, elapsed, bound);
    assert!(admitted as f64 <= bound);
    // Contention must not starve the bucket either.
    assert!(admitted as f64 >= 0.8 * rate * run_for.as_secs_f64());
}
