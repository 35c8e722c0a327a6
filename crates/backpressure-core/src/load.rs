//! Point-in-time load snapshot.

use std::time::{Duration, Instant};

/// Immutable snapshot of engine load.
///
/// Produced once per sampling interval by the capacity controller and
/// consumed by the load shedder. A snapshot is never mutated after it is
/// captured; publishers replace the whole value (typically behind an `Arc`).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadMetrics {
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// 99th percentile task latency over the last sampling window.
    pub p99_latency: Duration,
    /// Fraction of offered tasks rejected during the last window (0.0 to 1.0).
    pub rejection_rate: f64,
    /// Fraction of live workers currently executing a task (0.0 to 1.0).
    pub worker_utilization: f64,
    /// Live worker count.
    pub workers: usize,
    /// Workers currently executing a task.
    pub busy_workers: usize,
    /// Outstanding admission tickets.
    pub in_flight: usize,
    /// When the snapshot was taken.
    pub captured_at: Instant,
}

impl LoadMetrics {
    /// A snapshot describing an idle engine.
    pub fn idle(queue_capacity: usize, workers: usize) -> Self {
        Self {
            queue_depth: 0,
            queue_capacity,
            p99_latency: Duration::ZERO,
            rejection_rate: 0.0,
            worker_utilization: 0.0,
            workers,
            busy_workers: 0,
            in_flight: 0,
            captured_at: Instant::now(),
        }
    }

    /// Queue depth as a fraction of capacity.
    ///
    /// A zero-capacity queue reports `1.0` when anything is waiting and `0.0`
    /// otherwise.
    pub fn queue_ratio(&self) -> f64 {
        if self.queue_capacity == 0 {
            if self.queue_depth > 0 {
                1.0
            } else {
                0.0
            }
        } else {
            self.queue_depth as f64 / self.queue_capacity as f64
        }
    }

    /// P99 latency as a multiple of `target`. A zero target disables the signal.
    pub fn latency_ratio(&self, target: Duration) -> f64 {
        if target.is_zero() {
            0.0
        } else {
            self.p99_latency.as_secs_f64() / target.as_secs_f64()
        }
    }
}
