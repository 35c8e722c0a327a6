use crate::events::PoolEvent;
use crate::{AdmissionController, TaskOutcome, WorkerPool};
use backpressure_circuitbreaker::CircuitBreaker;
use backpressure_core::error::ConfigError;
use backpressure_core::events::{EventListeners, FnListener};
use backpressure_core::Priority;
use std::time::Duration;

/// Configuration for the worker pool.
pub struct WorkerPoolConfig {
    pub(crate) min_workers: usize,
    pub(crate) max_workers: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) latency_window: usize,
    pub(crate) latency_horizon: Duration,
    pub(crate) event_listeners: EventListeners<PoolEvent>,
    pub(crate) name: String,
}

/// Builder for [`WorkerPool`].
pub struct WorkerPoolConfigBuilder {
    min_workers: usize,
    max_workers: usize,
    initial_workers: Option<usize>,
    queue_capacity: usize,
    latency_window: usize,
    latency_horizon: Duration,
    admission: Option<AdmissionController>,
    circuit_breaker: Option<CircuitBreaker>,
    event_listeners: EventListeners<PoolEvent>,
    name: String,
}

impl Default for WorkerPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - min_workers: 1
    /// - max_workers: 16
    /// - initial_workers: min_workers
    /// - queue_capacity: 1024
    /// - latency_window: 1024 samples
    /// - latency_horizon: 1s
    /// - admission: `max_workers` slots, no rate limit
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            min_workers: 1,
            max_workers: 16,
            initial_workers: None,
            queue_capacity: 1024,
            latency_window: 1024,
            latency_horizon: Duration::from_secs(1),
            admission: None,
            circuit_breaker: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the lower bound for the worker count.
    pub fn min_workers(mut self, n: usize) -> Self {
        self.min_workers = n;
        self
    }

    /// Sets the upper bound for the worker count.
    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    /// Sets how many workers are started. Defaults to `min_workers`.
    pub fn initial_workers(mut self, n: usize) -> Self {
        self.initial_workers = Some(n);
        self
    }

    /// Sets the bounded queue capacity.
    ///
    /// With a capacity of zero the pool only accepts a task when a worker
    /// that is not already running or admitting one can start it right away.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Sets how many recent latency samples are kept for percentiles.
    pub fn latency_window(mut self, samples: usize) -> Self {
        self.latency_window = samples;
        self
    }

    /// Sets how long a latency sample counts towards the percentiles.
    ///
    /// Once no task has finished within the horizon the pool reports zero
    /// latency.
    pub fn latency_horizon(mut self, horizon: Duration) -> Self {
        self.latency_horizon = horizon;
        self
    }

    /// Sets the admission controller workers acquire through.
    pub fn admission(mut self, admission: AdmissionController) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Sets the circuit breaker consulted for guarded tasks.
    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Give this pool a human-readable name for observability.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked whenever a task is resolved without running.
    ///
    /// # Callback Signature
    /// `Fn(Priority, &'static str)` - Called with the task priority and the
    /// rejection kind (`queue_full`, `rate_limited`, `shutdown`, ...).
    pub fn on_task_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Priority, &'static str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::TaskRejected {
                priority, reason, ..
            } = event
            {
                f(*priority, *reason);
            }
        }));
        self
    }

    /// Registers a callback invoked whenever a task body finishes.
    pub fn on_task_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(TaskOutcome, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::TaskFinished {
                outcome, duration, ..
            } = event
            {
                f(*outcome, *duration);
            }
        }));
        self
    }

    /// Registers a callback invoked when the worker target changes.
    pub fn on_resize<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::WorkersResized { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    /// Adds already-built listeners.
    pub fn event_listeners(mut self, listeners: EventListeners<PoolEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Validates the configuration, builds the pool and starts its workers.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> Result<WorkerPool, ConfigError> {
        if self.min_workers == 0 {
            return Err(ConfigError::new("min_workers", "must be at least 1"));
        }
        if self.max_workers < self.min_workers {
            return Err(ConfigError::new(
                "max_workers",
                format!(
                    "must be at least min_workers ({}), got {}",
                    self.min_workers, self.max_workers
                ),
            ));
        }
        let initial = self.initial_workers.unwrap_or(self.min_workers);
        if initial < self.min_workers || initial > self.max_workers {
            return Err(ConfigError::new(
                "initial_workers",
                format!(
                    "must be within [{}, {}], got {}",
                    self.min_workers, self.max_workers, initial
                ),
            ));
        }

        let admission = match self.admission {
            Some(admission) => admission,
            None => AdmissionController::builder()
                .max_concurrency(self.max_workers)
                .name(self.name.clone())
                .build()?,
        };

        let config = WorkerPoolConfig {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            queue_capacity: self.queue_capacity,
            latency_window: self.latency_window,
            latency_horizon: self.latency_horizon,
            event_listeners: self.event_listeners,
            name: self.name,
        };

        Ok(WorkerPool::start(
            config,
            admission,
            self.circuit_breaker,
            initial,
        ))
    }
}
