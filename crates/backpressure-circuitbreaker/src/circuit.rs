use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// The circuit is half-open and a single trial call is allowed.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Returns the state name, as used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of circuit breaker state for observability.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitMetrics {
    /// Current state of the circuit breaker.
    pub state: CircuitState,
    /// Failures recorded since the last success or state change.
    pub consecutive_failures: usize,
    /// Configured failure threshold.
    pub failure_threshold: usize,
    /// Number of state transitions so far.
    pub generation: u64,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
}

/// Lock-free copy of `(state, generation)`, packed into one word so both
/// halves are always read together.
#[derive(Debug)]
pub(crate) struct StateMirror {
    packed: AtomicU64,
}

impl StateMirror {
    pub(crate) fn new() -> Self {
        Self {
            packed: AtomicU64::new(CircuitState::Closed as u64),
        }
    }

    pub(crate) fn load(&self) -> (CircuitState, u64) {
        let packed = self.packed.load(Ordering::Acquire);
        (CircuitState::from_u8((packed & 0b11) as u8), packed >> 2)
    }

    fn store(&self, state: CircuitState, generation: u64) {
        self.packed
            .store((generation << 2) | state as u64, Ordering::Release);
    }
}

/// Mutable breaker state, guarded by the breaker's lock.
///
/// The lock is held only for a read-modify-write of these fields, never
/// across the guarded operation.
pub(crate) struct Circuit {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    last_state_change: Instant,
    /// Bumped on every transition. Permits remember the generation they
    /// were issued in so stale outcomes can be discarded.
    generation: u64,
}

impl Circuit {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_state_change: now,
            generation: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn metrics(&self, config: &CircuitBreakerConfig, now: Instant) -> CircuitMetrics {
        CircuitMetrics {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            failure_threshold: config.failure_threshold,
            generation: self.generation,
            time_since_state_change: now.saturating_duration_since(self.last_state_change),
        }
    }

    /// Returns true once an open circuit has waited out its reset timeout.
    pub(crate) fn reset_timeout_elapsed(&self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        match self.opened_at {
            Some(opened_at) => now.saturating_duration_since(opened_at) >= config.reset_timeout,
            None => true,
        }
    }

    pub(crate) fn record_success(
        &mut self,
        config: &CircuitBreakerConfig,
        mirror: &StateMirror,
        trial: bool,
        now: Instant,
    ) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "success").increment(1);

        match self.state {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                self.transition_to(CircuitState::Closed, config, mirror, now)
            }
            _ => {}
        }
    }

    pub(crate) fn record_failure(
        &mut self,
        config: &CircuitBreakerConfig,
        mirror: &StateMirror,
        trial: bool,
        now: Instant,
    ) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => config.name.clone(), "outcome" => "failure").increment(1);

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(CircuitState::Open, config, mirror, now);
                }
            }
            CircuitState::HalfOpen if trial => {
                self.transition_to(CircuitState::Open, config, mirror, now)
            }
            _ => {}
        }
    }

    pub(crate) fn transition_to(
        &mut self,
        state: CircuitState,
        config: &CircuitBreakerConfig,
        mirror: &StateMirror,
        now: Instant,
    ) {
        if self.state == state {
            return;
        }

        let from_state = self.state;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                pattern_name: config.name.clone(),
                timestamp: Instant::now(),
                from_state,
                to_state: state,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(
            circuitbreaker = %config.name,
            from = ?from_state,
            to = ?state,
            consecutive_failures = self.consecutive_failures,
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => config.name.clone(),
                "from" => from_state.as_str(),
                "to" => state.as_str()
            )
            .increment(1);

            gauge!("circuitbreaker_state", "circuitbreaker" => config.name.clone())
                .set(state as u8 as f64);
        }

        self.state = state;
        self.generation += 1;
        self.last_state_change = now;
        self.consecutive_failures = 0;
        self.opened_at = match state {
            CircuitState::Open => Some(now),
            _ => None,
        };
        mirror.store(state, self.generation);
    }
}
