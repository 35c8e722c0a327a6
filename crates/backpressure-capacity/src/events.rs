use backpressure_core::BackpressureEvent;
use std::time::{Duration, Instant};

/// Events emitted by the capacity controller.
#[derive(Debug, Clone)]
pub enum CapacityEvent {
    /// A fresh load snapshot was published.
    Sampled {
        pattern_name: String,
        timestamp: Instant,
        /// Observed arrival rate in tasks per second, if it could be measured.
        arrival_rate: Option<f64>,
        queue_depth: usize,
        rejection_rate: f64,
        worker_utilization: f64,
    },
    /// The worker target was changed.
    Resized {
        pattern_name: String,
        timestamp: Instant,
        from: usize,
        to: usize,
        arrival_rate: f64,
        service_time: Duration,
    },
    /// A resize was wanted but the cooldown had not elapsed.
    ResizeSuppressed {
        pattern_name: String,
        timestamp: Instant,
        current: usize,
        desired: usize,
        /// Time left until resizing is allowed again.
        remaining: Duration,
    },
}

impl BackpressureEvent for CapacityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CapacityEvent::Sampled { .. } => "sampled",
            CapacityEvent::Resized { .. } => "resized",
            CapacityEvent::ResizeSuppressed { .. } => "resize_suppressed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CapacityEvent::Sampled { timestamp, .. }
            | CapacityEvent::Resized { timestamp, .. }
            | CapacityEvent::ResizeSuppressed { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CapacityEvent::Sampled { pattern_name, .. }
            | CapacityEvent::Resized { pattern_name, .. }
            | CapacityEvent::ResizeSuppressed { pattern_name, .. } => pattern_name,
        }
    }
}
