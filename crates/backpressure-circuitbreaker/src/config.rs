use crate::events::CircuitBreakerEvent;
use crate::{CircuitBreaker, CircuitState};
use backpressure_core::error::ConfigError;
use backpressure_core::events::{EventListeners, FnListener};
use backpressure_core::{SharedClock, SystemClock};
use std::time::Duration;

/// Configuration for the circuit breaker.
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: usize,
    pub(crate) reset_timeout: Duration,
    pub(crate) clock: SharedClock,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

/// Builder for configuring and constructing a circuit breaker.
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: usize,
    reset_timeout: Duration,
    clock: Option<SharedClock>,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            clock: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the number of consecutive failures that opens the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Sets how long the circuit stays open before allowing a trial call.
    ///
    /// Default: 30 seconds
    pub fn reset_timeout(mut self, duration: Duration) -> Self {
        self.reset_timeout = duration;
        self
    }

    /// Sets the time source. Defaults to the system clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Give this breaker a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback when the circuit breaker transitions between states.
    ///
    /// # Callback Signature
    /// `Fn(CircuitState, CircuitState)` - Called with the state the circuit is
    /// leaving and the state it is entering.
    ///
    /// # Example
    /// ```rust
    /// use backpressure_circuitbreaker::{CircuitBreaker, CircuitState};
    ///
    /// let breaker = CircuitBreaker::builder()
    ///     .failure_threshold(3)
    ///     .on_state_transition(|from, to| {
    ///         println!("Circuit breaker: {:?} -> {:?}", from, to);
    ///         if to == CircuitState::Open {
    ///             println!("WARNING: dependency presumed unhealthy");
    ///         }
    ///     })
    ///     .build()
    ///     .unwrap();
    /// # let _ = breaker;
    /// ```
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::StateTransition {
                from_state,
                to_state,
                ..
            } = event
            {
                f(*from_state, *to_state);
            }
        }));
        self
    }

    /// Registers a callback when a call is rejected because the circuit is open
    /// (or the half-open trial slot is taken).
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::CallRejected { .. } = event {
                f();
            }
        }));
        self
    }

    /// Registers a callback when a call is permitted.
    ///
    /// # Callback Signature
    /// `Fn(CircuitState)` - Called with the state the permit was issued in.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::CallPermitted { state, .. } = event {
                f(*state);
            }
        }));
        self
    }

    /// Adds already-built listeners, e.g. ones collected by an engine builder.
    pub fn event_listeners(mut self, listeners: EventListeners<CircuitBreakerEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    pub(crate) fn into_config(self) -> Result<CircuitBreakerConfig, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::new("failure_threshold", "must be at least 1"));
        }

        Ok(CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            clock: self.clock.unwrap_or_else(SystemClock::shared),
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }

    /// Validates the configuration and builds the circuit breaker.
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.into_config().map(CircuitBreaker::new)
    }
}
