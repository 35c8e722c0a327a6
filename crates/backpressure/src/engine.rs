use crate::config::{EngineBuilder, EngineConfig, Listeners};
use backpressure_capacity::{CapacityController, CapacityTarget, LoadSample};
use backpressure_circuitbreaker::CircuitBreaker;
use backpressure_core::{
    BackpressureError, ConfigError, LoadMetrics, Priority, SharedClock, SystemClock,
};
use backpressure_pool::{
    AdmissionController, PoolStats, TaskContext, TaskHandle, TaskOptions, WorkerPool,
};
use backpressure_ratelimiter::RateLimiter;
use backpressure_shedder::LoadShedder;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the capacity controller sees: the pool plus the tasks the shedder
/// turned away before they reached it.
struct EngineTarget {
    pool: Arc<WorkerPool>,
    shed: Arc<AtomicU64>,
}

impl CapacityTarget for EngineTarget {
    fn sample(&self) -> LoadSample {
        let stats = self.pool.stats();
        let shed = self.shed.load(Ordering::Relaxed);
        LoadSample {
            offered: stats.offered + shed,
            rejected: stats.rejected + shed,
            queue_depth: stats.queue_depth,
            queue_capacity: stats.queue_capacity,
            workers: stats.workers,
            busy: stats.busy,
            in_flight: stats.in_flight,
            mean_service: stats.latency.mean_service,
            p99_latency: stats.latency.p99,
        }
    }

    fn workers(&self) -> usize {
        self.pool.stats().target_workers
    }

    fn resize(&self, n: usize) -> usize {
        self.pool.set_worker_count(n)
    }
}

struct EngineInner {
    name: String,
    shedder: LoadShedder,
    pool: Arc<WorkerPool>,
    controller: Arc<CapacityController>,
    shed: Arc<AtomicU64>,
    control: CancellationToken,
    control_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.control.cancel();
    }
}

/// Bounded task execution engine.
///
/// Every submission passes the load shedder, then the bounded queue. A worker
/// dequeues the task, takes a rate limiter token and a concurrency slot, and
/// for guarded tasks asks the circuit breaker, before running the body. A
/// background loop samples load, publishes the snapshot the shedder reads and
/// resizes the pool.
///
/// `Engine` is cheap to clone; clones share the same workers.
///
/// # Examples
///
/// ```
/// use backpressure::{Engine, Priority};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Engine::builder().workers(1, 4).build().unwrap();
///
/// let handle = engine
///     .submit(Priority::Normal, |_ctx| async { Ok::<_, std::io::Error>(21 * 2) })
///     .unwrap();
/// assert_eq!(handle.await.unwrap(), 42);
///
/// engine.shutdown(Duration::from_secs(1)).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates a new builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Builds an engine from plain configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        EngineBuilder::from_config(config).build()
    }

    pub(crate) fn start(
        config: EngineConfig,
        clock: Option<SharedClock>,
        listeners: Listeners,
    ) -> Result<Self, ConfigError> {
        let clock = clock.unwrap_or_else(SystemClock::shared);
        let name = config.name.clone();

        let shedder = LoadShedder::builder()
            .thresholds(config.shed_thresholds)
            .weights(config.shed_weights)
            .latency_target(config.latency_target)
            .name(name.clone())
            .event_listeners(listeners.shedder)
            .build()?;

        let mut admission = AdmissionController::builder()
            .max_concurrency(config.max_concurrency.unwrap_or(config.max_workers))
            .name(name.clone());
        if let Some(rate) = config.rate_limit {
            admission = admission.rate_limiter(
                RateLimiter::builder()
                    .capacity(rate.capacity)
                    .refill_rate(rate.refill_rate)
                    .clock(Arc::clone(&clock))
                    .name(name.clone())
                    .event_listeners(listeners.rate_limiter)
                    .build()?,
            );
        }
        let admission = admission.build()?;

        let breaker = config
            .circuit_breaker
            .map(|cb| {
                CircuitBreaker::builder()
                    .failure_threshold(cb.failure_threshold)
                    .reset_timeout(cb.reset_timeout)
                    .clock(Arc::clone(&clock))
                    .name(name.clone())
                    .event_listeners(listeners.circuit_breaker)
                    .build()
            })
            .transpose()?;

        let control_config = config.capacity_control;
        let controller = CapacityController::builder()
            .min_workers(config.min_workers)
            .max_workers(config.max_workers)
            .interval(control_config.interval)
            .safety_multiplier(control_config.safety_multiplier)
            .cooldown(control_config.cooldown)
            .resizing(control_config.enabled)
            .clock(Arc::clone(&clock))
            .name(name.clone())
            .event_listeners(listeners.capacity);

        let mut pool = WorkerPool::builder()
            .min_workers(config.min_workers)
            .max_workers(config.max_workers)
            .queue_capacity(config.queue_capacity)
            .latency_window(config.latency_window)
            // Percentiles cover one sampling window, so the shedder sees
            // current latency rather than the last spike.
            .latency_horizon(control_config.interval)
            .admission(admission)
            .name(name.clone())
            .event_listeners(listeners.pool);
        if let Some(initial) = config.initial_workers {
            pool = pool.initial_workers(initial);
        }
        if let Some(breaker) = breaker {
            pool = pool.circuit_breaker(breaker);
        }
        let pool = Arc::new(pool.build()?);

        let shed = Arc::new(AtomicU64::new(0));
        let target = Arc::new(EngineTarget {
            pool: Arc::clone(&pool),
            shed: Arc::clone(&shed),
        });
        // On error the pool is dropped here, which closes it.
        let controller = Arc::new(controller.build(target)?);

        let control = CancellationToken::new();
        let control_task = Arc::clone(&controller).spawn(control.clone());

        tracing::info!(
            engine = %name,
            min_workers = config.min_workers,
            max_workers = config.max_workers,
            queue_capacity = config.queue_capacity,
            max_concurrency = pool.admission().max_concurrency(),
            rate_limited = config.rate_limit.is_some(),
            circuit_breaker = pool.circuit_breaker().is_some(),
            "engine started"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                name,
                shedder,
                pool,
                controller,
                shed,
                control,
                control_task: Mutex::new(Some(control_task)),
            }),
        })
    }

    /// Submits a task with the given priority.
    ///
    /// Never waits. Returns `ShedLoad` if the shedder rejects the priority at
    /// the current load, `QueueFull` if the queue is at capacity and
    /// `Shutdown` once shutdown has begun. Otherwise the handle resolves
    /// exactly once with the task's result or the reason it never ran.
    pub fn submit<F, Fut, T, E>(
        &self,
        priority: Priority,
        f: F,
    ) -> Result<TaskHandle<T, E>, BackpressureError<E>>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit_with(TaskOptions::new(priority), f)
    }

    /// Submits a task gated by the circuit breaker.
    ///
    /// While the breaker is open the handle resolves with `CircuitOpen`; the
    /// body's result is reported back to the breaker. Without a configured
    /// breaker this behaves like [`submit`](Self::submit).
    pub fn submit_guarded<F, Fut, T, E>(
        &self,
        priority: Priority,
        f: F,
    ) -> Result<TaskHandle<T, E>, BackpressureError<E>>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit_with(TaskOptions::new(priority).guarded(), f)
    }

    /// Submits a task with explicit options, e.g. a start deadline.
    pub fn submit_with<F, Fut, T, E>(
        &self,
        options: TaskOptions,
        f: F,
    ) -> Result<TaskHandle<T, E>, BackpressureError<E>>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let inner = &self.inner;
        if inner.pool.is_shutdown() {
            return Err(BackpressureError::Shutdown);
        }

        let load = inner.controller.latest();
        if let Err(err) = inner.shedder.evaluate(options.priority, &load).into_result() {
            inner.shed.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        inner
            .pool
            .submit(options, f)
            .map_err(BackpressureError::from)
    }

    /// Stops intake and drains the queue within `deadline`.
    ///
    /// The control loop stops first so the pool is not resized while it
    /// drains. On timeout, tasks still queued resolve with `Shutdown`, running
    /// bodies finish on their own, and `DeadlineExceeded` is returned. A second
    /// call returns `Shutdown`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), BackpressureError<Infallible>> {
        let inner = &self.inner;
        inner.control.cancel();

        let control_task = inner
            .control_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = control_task {
            if let Err(err) = task.await {
                tracing::warn!(engine = %inner.name, error = %err, "capacity control loop failed");
            }
        }

        let result = inner.pool.shutdown(deadline).await;
        match &result {
            Ok(()) => tracing::info!(engine = %inner.name, "engine stopped"),
            Err(err) => tracing::warn!(engine = %inner.name, error = %err, "engine stopped"),
        }
        result.map_err(BackpressureError::from)
    }

    /// Returns true once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.inner.pool.is_shutdown()
    }

    /// The load snapshot the shedder is currently deciding on.
    ///
    /// Refreshed once per sampling interval.
    pub fn stats(&self) -> Arc<LoadMetrics> {
        self.inner.controller.latest()
    }

    /// Samples load now and publishes the result.
    pub fn refresh_stats(&self) -> Arc<LoadMetrics> {
        self.inner.controller.observe().metrics
    }

    /// Detailed counters of the worker pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Tasks rejected by the load shedder since start.
    pub fn shed_count(&self) -> u64 {
        self.inner.shed.load(Ordering::Relaxed)
    }

    /// Moves the worker count towards `n` within the configured bounds.
    ///
    /// The control loop may later override this.
    pub fn set_worker_count(&self, n: usize) -> usize {
        self.inner.pool.set_worker_count(n)
    }

    /// The worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// The load shedder.
    pub fn shedder(&self) -> &LoadShedder {
        &self.inner.shedder
    }

    /// The capacity controller.
    pub fn capacity_controller(&self) -> &CapacityController {
        &self.inner.controller
    }

    /// The circuit breaker for guarded tasks, if configured.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.inner.pool.circuit_breaker()
    }

    /// The rate limiter, if configured.
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.inner.pool.admission().rate_limiter()
    }

    /// Returns the engine name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.inner.pool.stats();
        f.debug_struct("Engine")
            .field("name", &self.inner.name)
            .field("workers", &stats.workers)
            .field("queue_depth", &stats.queue_depth)
            .field("in_flight", &stats.in_flight)
            .field("shut_down", &self.is_shutdown())
            .finish()
    }
}
