use crate::CircuitState;
use backpressure_core::BackpressureEvent;
use std::time::Instant;

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        /// Name of the breaker instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State before the transition.
        from_state: CircuitState,
        /// State after the transition.
        to_state: CircuitState,
    },
    /// A permit was issued.
    CallPermitted {
        /// Name of the breaker instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State the permit was issued in.
        state: CircuitState,
    },
    /// A call was refused without reaching the dependency.
    CallRejected {
        /// Name of the breaker instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
    },
    /// A permit holder reported success.
    SuccessRecorded {
        /// Name of the breaker instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State when the outcome was recorded.
        state: CircuitState,
    },
    /// A permit holder reported failure.
    FailureRecorded {
        /// Name of the breaker instance.
        pattern_name: String,
        /// When the event occurred.
        timestamp: Instant,
        /// State when the outcome was recorded.
        state: CircuitState,
    },
}

impl BackpressureEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::CallPermitted { pattern_name, .. }
            | CircuitBreakerEvent::CallRejected { pattern_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { pattern_name, .. }
            | CircuitBreakerEvent::FailureRecorded { pattern_name, .. } => pattern_name,
        }
    }
}
