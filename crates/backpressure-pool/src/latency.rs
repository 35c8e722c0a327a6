//! Bounded window of recent task latencies.
//!
//! Samples leave the window when it is full or once they are older than the
//! horizon, so an idle pool reports no latency rather than its last spike.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Summary of the most recent task latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencySummary {
    /// Number of samples in the window.
    pub samples: usize,
    /// Mean time spent executing the body.
    pub mean_service: Duration,
    /// 99th percentile of submission-to-completion time.
    pub p99: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    finished_at: Instant,
    service: Duration,
    total: Duration,
}

/// Keeps at most `capacity` samples, none older than `horizon`.
#[derive(Debug)]
pub(crate) struct LatencyWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
    horizon: Duration,
}

impl LatencyWindow {
    pub(crate) fn new(capacity: usize, horizon: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            horizon,
        }
    }

    pub(crate) fn record(&mut self, now: Instant, service: Duration, total: Duration) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            finished_at: now,
            service,
            total,
        });
    }

    /// Summarises the samples still inside the horizon as of `now`.
    pub(crate) fn summary(&mut self, now: Instant) -> LatencySummary {
        // Samples arrive in completion order, so expired ones sit at the front.
        while let Some(oldest) = self.samples.front() {
            if now.saturating_duration_since(oldest.finished_at) > self.horizon {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let n = self.samples.len();
        if n == 0 {
            return LatencySummary::default();
        }

        let service_nanos: u128 = self.samples.iter().map(|s| s.service.as_nanos()).sum();
        let mean_nanos = u64::try_from(service_nanos / n as u128).unwrap_or(u64::MAX);
        let mut totals: Vec<Duration> = self.samples.iter().map(|s| s.total).collect();
        totals.sort_unstable();

        // Nearest-rank percentile.
        let rank = ((n as f64) * 0.99).ceil() as usize;
        let p99 = totals[rank.clamp(1, n) - 1];

        LatencySummary {
            samples: n,
            mean_service: Duration::from_nanos(mean_nanos),
            p99,
        }
    }
}
