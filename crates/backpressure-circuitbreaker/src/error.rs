use backpressure_core::BackpressureError;
use thiserror::Error;

/// Errors returned by the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError {
    /// The circuit is open (or the half-open trial is taken); the call was not attempted.
    #[error("circuit '{name}' is open; call not permitted")]
    OpenCircuit {
        /// Breaker name.
        name: String,
    },
}

impl CircuitBreakerError {
    /// Returns true if the error indicates the circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit { .. })
    }
}

impl<E> From<CircuitBreakerError> for BackpressureError<E> {
    fn from(err: CircuitBreakerError) -> Self {
        match err {
            CircuitBreakerError::OpenCircuit { name } => {
                BackpressureError::CircuitOpen { name: Some(name) }
            }
        }
    }
}
