//! Engine configuration.
//!
//! [`EngineConfig`] is plain data and, with the `serde` feature, can be
//! loaded from any serde format. [`EngineBuilder`] adds what cannot be
//! serialized: the clock and event listeners.

use crate::Engine;
use backpressure_capacity::CapacityEvent;
use backpressure_circuitbreaker::{CircuitBreakerEvent, CircuitState};
use backpressure_core::events::{EventListeners, FnListener};
use backpressure_core::{ConfigError, Priority, SharedClock};
use backpressure_pool::{PoolEvent, TaskOutcome};
use backpressure_ratelimiter::RateLimiterEvent;
use backpressure_shedder::{LoadShedderEvent, ShedThresholds, ShedWeights};
use std::time::Duration;

/// Token bucket settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateLimitConfig {
    /// Largest burst admitted at once.
    pub capacity: f64,
    /// Tokens credited per second.
    pub refill_rate: f64,
}

/// Circuit breaker settings for guarded tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: usize,
    /// Time the circuit stays open before a trial call.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Sampling and adaptive sizing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CapacityControlConfig {
    /// Resize the pool from observed load. Snapshots are published either way.
    pub enabled: bool,
    /// Sampling interval. Latency percentiles cover the same span.
    pub interval: Duration,
    /// Headroom on top of the Little's law estimate.
    pub safety_multiplier: f64,
    /// Minimum time between two resizes.
    pub cooldown: Duration,
}

impl Default for CapacityControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(1),
            safety_multiplier: 1.5,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Configuration for an [`Engine`].
///
/// # Examples
///
/// ```
/// use backpressure::EngineConfig;
///
/// let config = EngineConfig {
///     max_workers: 8,
///     queue_capacity: 256,
///     ..EngineConfig::default()
/// };
/// assert_eq!(config.min_workers, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Name used in logs, events and metric labels.
    pub name: String,
    /// Lower bound of the worker count.
    pub min_workers: usize,
    /// Upper bound of the worker count.
    pub max_workers: usize,
    /// Workers started with the engine. Defaults to `min_workers`.
    pub initial_workers: Option<usize>,
    /// Concurrency slots. Defaults to `max_workers`.
    pub max_concurrency: Option<usize>,
    /// Bounded queue capacity. Zero accepts a task only if it can start at once.
    pub queue_capacity: usize,
    /// Recent task latencies kept for percentiles.
    pub latency_window: usize,
    /// Token bucket consulted before each task starts. `None` disables it.
    pub rate_limit: Option<RateLimitConfig>,
    /// Breaker for guarded tasks. `None` leaves guarded tasks ungated.
    pub circuit_breaker: Option<CircuitBreakerSettings>,
    /// Load score at which each priority is shed.
    pub shed_thresholds: ShedThresholds,
    /// Weights of the load signals.
    pub shed_weights: ShedWeights,
    /// P99 latency that counts as full load for the shedder.
    pub latency_target: Duration,
    /// Sampling and adaptive sizing.
    pub capacity_control: CapacityControlConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            min_workers: 1,
            max_workers: 16,
            initial_workers: None,
            max_concurrency: None,
            queue_capacity: 1024,
            latency_window: 1024,
            rate_limit: None,
            circuit_breaker: None,
            shed_thresholds: ShedThresholds::default(),
            shed_weights: ShedWeights::default(),
            latency_target: Duration::from_millis(500),
            capacity_control: CapacityControlConfig::default(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) rate_limiter: EventListeners<RateLimiterEvent>,
    pub(crate) circuit_breaker: EventListeners<CircuitBreakerEvent>,
    pub(crate) shedder: EventListeners<LoadShedderEvent>,
    pub(crate) pool: EventListeners<PoolEvent>,
    pub(crate) capacity: EventListeners<CapacityEvent>,
}

/// Builder for [`Engine`].
///
/// # Examples
///
/// ```
/// use backpressure::Engine;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Engine::builder()
///     .name("ingest")
///     .workers(2, 8)
///     .queue_capacity(100)
///     .rate_limit(50.0, 100.0)
///     .circuit_breaker(5, Duration::from_secs(10))
///     .build()
///     .unwrap();
/// # engine.shutdown(Duration::from_secs(1)).await.unwrap();
/// # }
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<SharedClock>,
    listeners: Listeners,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a builder with [`EngineConfig::default`].
    pub fn new() -> Self {
        Self::from_config(EngineConfig::default())
    }

    /// Creates a builder starting from an existing configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            clock: None,
            listeners: Listeners::default(),
        }
    }

    /// Sets the engine name.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the worker count bounds.
    pub fn workers(mut self, min: usize, max: usize) -> Self {
        self.config.min_workers = min;
        self.config.max_workers = max;
        self
    }

    /// Sets how many workers start with the engine.
    pub fn initial_workers(mut self, n: usize) -> Self {
        self.config.initial_workers = Some(n);
        self
    }

    /// Sets the number of concurrency slots.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = Some(n);
        self
    }

    /// Sets the bounded queue capacity.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n;
        self
    }

    /// Sets how many recent task latencies are kept.
    pub fn latency_window(mut self, samples: usize) -> Self {
        self.config.latency_window = samples;
        self
    }

    /// Enables the token bucket.
    pub fn rate_limit(mut self, capacity: f64, refill_rate: f64) -> Self {
        self.config.rate_limit = Some(RateLimitConfig {
            capacity,
            refill_rate,
        });
        self
    }

    /// Enables the circuit breaker for guarded tasks.
    pub fn circuit_breaker(mut self, failure_threshold: usize, reset_timeout: Duration) -> Self {
        self.config.circuit_breaker = Some(CircuitBreakerSettings {
            failure_threshold,
            reset_timeout,
        });
        self
    }

    /// Sets the shedding threshold of one priority. `None` never sheds it.
    pub fn shed_threshold(mut self, priority: Priority, threshold: Option<f64>) -> Self {
        self.config.shed_thresholds.set(priority, threshold);
        self
    }

    /// Sets every shedding threshold.
    pub fn shed_thresholds(mut self, thresholds: ShedThresholds) -> Self {
        self.config.shed_thresholds = thresholds;
        self
    }

    /// Sets the load signal weights.
    pub fn shed_weights(mut self, weights: ShedWeights) -> Self {
        self.config.shed_weights = weights;
        self
    }

    /// Sets the p99 latency that counts as full load.
    pub fn latency_target(mut self, target: Duration) -> Self {
        self.config.latency_target = target;
        self
    }

    /// Sets the sampling and adaptive sizing settings.
    pub fn capacity_control(mut self, control: CapacityControlConfig) -> Self {
        self.config.capacity_control = control;
        self
    }

    /// Sets the time source for the rate limiter, the breaker and the controller.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registers a callback when a task is shed.
    pub fn on_shed<F>(mut self, f: F) -> Self
    where
        F: Fn(Priority, f64) + Send + Sync + 'static,
    {
        self.listeners
            .shedder
            .add(FnListener::new(move |event: &LoadShedderEvent| {
                let LoadShedderEvent::LoadShed {
                    priority, score, ..
                } = event;
                f(*priority, *score);
            }));
        self
    }

    /// Registers a callback when the pool resolves a task without running it.
    ///
    /// # Callback Signature
    /// `Fn(Priority, &'static str)` - Called with the priority and the
    /// rejection kind. Shed tasks are reported through [`on_shed`](Self::on_shed).
    pub fn on_task_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Priority, &'static str) + Send + Sync + 'static,
    {
        self.listeners.pool.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::TaskRejected {
                priority, reason, ..
            } = event
            {
                f(*priority, *reason);
            }
        }));
        self
    }

    /// Registers a callback when a task body finishes.
    pub fn on_task_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(TaskOutcome, Duration) + Send + Sync + 'static,
    {
        self.listeners.pool.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::TaskFinished {
                outcome, duration, ..
            } = event
            {
                f(*outcome, *duration);
            }
        }));
        self
    }

    /// Registers a callback when the worker target changes.
    pub fn on_resize<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.listeners.pool.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::WorkersResized { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    /// Registers a callback when the circuit breaker changes state.
    pub fn on_circuit_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.listeners
            .circuit_breaker
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
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

    /// Adds rate limiter listeners.
    pub fn rate_limiter_listeners(mut self, listeners: EventListeners<RateLimiterEvent>) -> Self {
        self.listeners.rate_limiter.extend(listeners);
        self
    }

    /// Adds circuit breaker listeners.
    pub fn circuit_breaker_listeners(
        mut self,
        listeners: EventListeners<CircuitBreakerEvent>,
    ) -> Self {
        self.listeners.circuit_breaker.extend(listeners);
        self
    }

    /// Adds load shedder listeners.
    pub fn shedder_listeners(mut self, listeners: EventListeners<LoadShedderEvent>) -> Self {
        self.listeners.shedder.extend(listeners);
        self
    }

    /// Adds worker pool listeners.
    pub fn pool_listeners(mut self, listeners: EventListeners<PoolEvent>) -> Self {
        self.listeners.pool.extend(listeners);
        self
    }

    /// Adds capacity controller listeners.
    pub fn capacity_listeners(mut self, listeners: EventListeners<CapacityEvent>) -> Self {
        self.listeners.capacity.extend(listeners);
        self
    }

    /// Validates the configuration, starts the workers and the control loop.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> Result<Engine, ConfigError> {
        Engine::start(self.config, self.clock, self.listeners)
    }
}
