use backpressure_core::{BackpressureEvent, Priority};
use std::time::Instant;

/// Events emitted by the load shedder.
#[derive(Debug, Clone)]
pub enum LoadShedderEvent {
    /// A task was rejected for its priority.
    LoadShed {
        /// Name of the shedder instance.
        pattern_name: String,
        /// When the decision was made.
        timestamp: Instant,
        /// Priority of the rejected task.
        priority: Priority,
        /// Composite load score the decision was based on.
        score: f64,
        /// Threshold the score reached.
        threshold: f64,
    },
}

impl BackpressureEvent for LoadShedderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoadShedderEvent::LoadShed { .. } => "load_shed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            LoadShedderEvent::LoadShed { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            LoadShedderEvent::LoadShed { pattern_name, .. } => pattern_name,
        }
    }

    fn priority(&self) -> Option<Priority> {
        match self {
            LoadShedderEvent::LoadShed { priority, .. } => Some(*priority),
        }
    }
}
