//! Consecutive-failure circuit breaker with a two-phase permit contract.
//!
//! The breaker tracks failures of an operation that depends on something
//! unreliable and fails fast once the dependency looks unhealthy.
//!
//! ## States
//!
//! - **Closed**: calls proceed. Each failure increments a consecutive-failure
//!   counter and any success resets it. Reaching `failure_threshold` opens the
//!   circuit.
//! - **Open**: every call is refused without touching the dependency. After
//!   `reset_timeout` the next caller moves the circuit to half-open.
//! - **HalfOpen**: exactly one trial call is let through. Success closes the
//!   circuit; failure reopens it.
//!
//! ## Two-phase contract
//!
//! Instead of wrapping the call, the breaker hands out a [`Permit`] and the
//! caller reports the outcome. This keeps the breaker independent of how the
//! guarded work is executed.
//!
//! ```rust
//! use backpressure_circuitbreaker::{CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::builder()
//!     .failure_threshold(2)
//!     .reset_timeout(Duration::from_secs(5))
//!     .name("billing-api")
//!     .build()
//!     .unwrap();
//!
//! for _ in 0..2 {
//!     let permit = breaker.allow().unwrap();
//!     // ... call the dependency, which fails ...
//!     breaker.record_failure(permit);
//! }
//!
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(breaker.allow().is_err());
//! ```
//!
//! ## Concurrency
//!
//! The half-open trial slot is claimed with an atomic compare-and-swap, and
//! `state()` reads an atomic mirror. The internal lock only covers the
//! read-modify-write of the counters and is never held while the guarded
//! operation runs.

mod circuit;
mod config;
mod error;
mod events;

pub use circuit::{CircuitMetrics, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;

use crate::circuit::{Circuit, StateMirror};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Identifier of an issued [`Permit`]. Unique per breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermitId(u64);

impl PermitId {
    /// Returns the raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PermitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permit-{}", self.0)
    }
}

/// Permission to perform one guarded call.
///
/// Hand it back through [`CircuitBreaker::record_success`] or
/// [`CircuitBreaker::record_failure`]. Outcomes of permits issued before the
/// breaker's most recent state change are ignored. A half-open trial permit
/// dropped without an outcome counts as a failed trial, so the trial slot
/// can never leak.
#[must_use = "report the outcome with record_success or record_failure"]
pub struct Permit {
    id: PermitId,
    generation: u64,
    trial: bool,
    reported: bool,
    shared: Arc<Shared>,
}

impl Permit {
    /// Returns the permit identifier.
    pub fn id(&self) -> PermitId {
        self.id
    }

    /// Returns true if this is the single half-open trial permit.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("trial", &self.trial)
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.trial && !self.reported {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                circuitbreaker = %self.shared.config.name,
                permit = %self.id,
                "half-open trial permit dropped without an outcome"
            );
            self.shared.record(self.generation, true, false);
        }
    }
}

struct Shared {
    circuit: Mutex<Circuit>,
    mirror: StateMirror,
    /// Highest generation whose half-open trial has been handed out.
    trial_claimed: AtomicU64,
    next_permit: AtomicU64,
    config: CircuitBreakerConfig,
}

impl Shared {
    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, generation: u64, trial: bool, success: bool) {
        let now = self.config.clock.now();
        let mut circuit = self.circuit();
        if circuit.generation() != generation {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                circuitbreaker = %self.config.name,
                generation,
                current = circuit.generation(),
                "ignoring outcome of stale permit"
            );
            return;
        }
        if success {
            circuit.record_success(&self.config, &self.mirror, trial, now);
        } else {
            circuit.record_failure(&self.config, &self.mirror, trial, now);
        }
    }
}

/// A circuit breaker.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl CircuitBreaker {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub(crate) fn new(config: CircuitBreakerConfig) -> Self {
        let now = config.clock.now();
        Self {
            shared: Arc::new(Shared {
                circuit: Mutex::new(Circuit::new(now)),
                mirror: StateMirror::new(),
                trial_claimed: AtomicU64::new(0),
                next_permit: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Asks permission for one guarded call. Never blocks.
    pub fn allow(&self) -> Result<Permit, CircuitBreakerError> {
        let (state, generation) = self.shared.mirror.load();
        match state {
            CircuitState::Closed => Ok(self.permit(generation, false, state)),
            CircuitState::HalfOpen => self.claim_trial(generation),
            CircuitState::Open => {
                let now = self.shared.config.clock.now();
                let (state, generation) = {
                    let mut circuit = self.shared.circuit();
                    if circuit.state() == CircuitState::Open
                        && circuit.reset_timeout_elapsed(&self.shared.config, now)
                    {
                        circuit.transition_to(
                            CircuitState::HalfOpen,
                            &self.shared.config,
                            &self.shared.mirror,
                            now,
                        );
                    }
                    (circuit.state(), circuit.generation())
                };
                match state {
                    CircuitState::Closed => Ok(self.permit(generation, false, state)),
                    CircuitState::HalfOpen => self.claim_trial(generation),
                    CircuitState::Open => Err(self.reject()),
                }
            }
        }
    }

    /// Reports that the call guarded by `permit` succeeded.
    pub fn record_success(&self, mut permit: Permit) {
        permit.reported = true;
        self.shared.record(permit.generation, permit.trial, true);
    }

    /// Reports that the call guarded by `permit` failed.
    pub fn record_failure(&self, mut permit: Permit) {
        permit.reported = true;
        self.shared.record(permit.generation, permit.trial, false);
    }

    /// Returns the current state without taking the lock.
    pub fn state(&self) -> CircuitState {
        self.shared.mirror.load().0
    }

    /// Returns a snapshot of the breaker's counters.
    pub fn metrics(&self) -> CircuitMetrics {
        let now = self.shared.config.clock.now();
        self.shared.circuit().metrics(&self.shared.config, now)
    }

    /// Forces the circuit open, e.g. from an external health check.
    pub fn force_open(&self) {
        self.transition(CircuitState::Open);
    }

    /// Forces the circuit closed and resets its counters.
    pub fn force_closed(&self) {
        self.transition(CircuitState::Closed);
    }

    /// Alias for [`force_closed`](Self::force_closed).
    pub fn reset(&self) {
        self.force_closed();
    }

    /// Returns the breaker name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    fn transition(&self, state: CircuitState) {
        let now = self.shared.config.clock.now();
        self.shared
            .circuit()
            .transition_to(state, &self.shared.config, &self.shared.mirror, now);
    }

    fn claim_trial(&self, generation: u64) -> Result<Permit, CircuitBreakerError> {
        // Generations only grow, so fetch_max hands the trial for a given
        // generation to exactly one caller.
        let previous = self
            .shared
            .trial_claimed
            .fetch_max(generation, Ordering::AcqRel);
        if previous >= generation {
            return Err(self.reject());
        }
        if self.shared.mirror.load() != (CircuitState::HalfOpen, generation) {
            // The circuit moved on while we were claiming.
            return Err(self.reject());
        }
        Ok(self.permit(generation, true, CircuitState::HalfOpen))
    }

    fn permit(&self, generation: u64, trial: bool, state: CircuitState) -> Permit {
        let id = PermitId(self.shared.next_permit.fetch_add(1, Ordering::Relaxed));

        self.shared
            .config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallPermitted {
                pattern_name: self.shared.config.name.clone(),
                timestamp: Instant::now(),
                state,
            });

        Permit {
            id,
            generation,
            trial,
            reported: false,
            shared: Arc::clone(&self.shared),
        }
    }

    fn reject(&self) -> CircuitBreakerError {
        self.shared
            .config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallRejected {
                pattern_name: self.shared.config.name.clone(),
                timestamp: Instant::now(),
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuitbreaker" => self.shared.config.name.clone(), "outcome" => "rejected").increment(1);

        CircuitBreakerError::OpenCircuit {
            name: self.shared.config.name.clone(),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish()
    }
}
