//! Property tests for the load shedder.
//!
//! Invariants tested:
//! - Critical work is never shed under default thresholds
//! - Low priority work is shed exactly when the score reaches 0.5
//! - Admission is monotonic in priority
//! - The score is the largest weighted signal

use backpressure_core::{LoadMetrics, Priority};
use backpressure_shedder::LoadShedder;
use proptest::prelude::*;
use std::time::Duration;

fn load() -> impl Strategy<Value = LoadMetrics> {
    (0usize..=200, 0usize..=100, 0u64..=2_000, 0usize..=16, 0usize..=16).prop_map(
        |(depth, capacity, p99_ms, workers, busy)| {
            let busy = busy.min(workers);
            let mut load = LoadMetrics::idle(capacity, workers);
            load.queue_depth = depth.min(capacity);
            load.p99_latency = Duration::from_millis(p99_ms);
            load.busy_workers = busy;
            load.worker_utilization = if workers == 0 {
                0.0
            } else {
                busy as f64 / workers as f64
            };
            load
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: no load sheds critical work
    #[test]
    fn critical_never_shed(load in load()) {
        let shedder = LoadShedder::builder().build().unwrap();
        let decision = shedder.evaluate(Priority::Critical, &load);
        prop_assert!(decision.admitted);
        prop_assert_eq!(decision.threshold, None);
    }

    /// Property: low priority is shed exactly at score >= 0.5
    #[test]
    fn low_shed_at_half_load(load in load()) {
        let shedder = LoadShedder::builder().build().unwrap();
        let score = shedder.score(&load);
        prop_assert_eq!(shedder.should_admit(Priority::Low, &load), score < 0.5);
    }

    /// Property: if a priority is admitted, every higher one is too
    #[test]
    fn admission_is_monotonic(load in load()) {
        let shedder = LoadShedder::builder().build().unwrap();
        let admitted: Vec<bool> = Priority::ALL
            .iter()
            .map(|p| shedder.should_admit(*p, &load))
            .collect();
        for pair in admitted.windows(2) {
            prop_assert!(!pair[0] || pair[1], "admitted per priority: {:?}", admitted);
        }
    }

    /// Property: the score is the maximum of the three signals
    #[test]
    fn score_is_max_signal(load in load(), target_ms in 1u64..=1_000) {
        let target = Duration::from_millis(target_ms);
        let shedder = LoadShedder::builder().latency_target(target).build().unwrap();

        let expected = load
            .queue_ratio()
            .max(load.latency_ratio(target))
            .max(load.worker_utilization);
        prop_assert!((shedder.score(&load) - expected).abs() < 1e-12);
        prop_assert!(shedder.score(&load) >= 0.0);
    }
}
