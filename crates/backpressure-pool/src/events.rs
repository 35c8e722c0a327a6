use crate::TaskOutcome;
use backpressure_core::{BackpressureEvent, Priority};
use std::time::{Duration, Instant};

/// Events emitted by the worker pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A task entered the queue.
    TaskAccepted {
        /// Name of the pool.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Task priority.
        priority: Priority,
        /// Queue depth after the task was enqueued.
        queue_depth: usize,
    },
    /// A task was resolved without running its body.
    TaskRejected {
        /// Name of the pool.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Task priority.
        priority: Priority,
        /// Rejection kind, e.g. `queue_full` or `rate_limited`.
        reason: &'static str,
    },
    /// A task body finished.
    TaskFinished {
        /// Name of the pool.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Task priority.
        priority: Priority,
        /// How the body finished.
        outcome: TaskOutcome,
        /// Time spent executing the body.
        duration: Duration,
    },
    /// The worker target changed.
    WorkersResized {
        /// Name of the pool.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Previous target.
        from: usize,
        /// New target.
        to: usize,
    },
    /// Shutdown began.
    ShutdownStarted {
        /// Name of the pool.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Tasks still queued.
        queued: usize,
    },
    /// Shutdown returned.
    ShutdownFinished {
        /// Name of the pool.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Queued tasks resolved with `Shutdown` because the deadline fired.
        abandoned: usize,
    },
}

impl BackpressureEvent for PoolEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PoolEvent::TaskAccepted { .. } => "task_accepted",
            PoolEvent::TaskRejected { .. } => "task_rejected",
            PoolEvent::TaskFinished { .. } => "task_finished",
            PoolEvent::WorkersResized { .. } => "workers_resized",
            PoolEvent::ShutdownStarted { .. } => "shutdown_started",
            PoolEvent::ShutdownFinished { .. } => "shutdown_finished",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            PoolEvent::TaskAccepted { timestamp, .. }
            | PoolEvent::TaskRejected { timestamp, .. }
            | PoolEvent::TaskFinished { timestamp, .. }
            | PoolEvent::WorkersResized { timestamp, .. }
            | PoolEvent::ShutdownStarted { timestamp, .. }
            | PoolEvent::ShutdownFinished { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            PoolEvent::TaskAccepted { pattern_name, .. }
            | PoolEvent::TaskRejected { pattern_name, .. }
            | PoolEvent::TaskFinished { pattern_name, .. }
            | PoolEvent::WorkersResized { pattern_name, .. }
            | PoolEvent::ShutdownStarted { pattern_name, .. }
            | PoolEvent::ShutdownFinished { pattern_name, .. } => pattern_name,
        }
    }

    fn priority(&self) -> Option<Priority> {
        match self {
            PoolEvent::TaskAccepted { priority, .. }
            | PoolEvent::TaskRejected { priority, .. }
            | PoolEvent::TaskFinished { priority, .. } => Some(*priority),
            _ => None,
        }
    }
}
