//! Fixed set of workers draining one bounded queue.

use crate::admission::{AdmissionController, Ticket};
use crate::config::{WorkerPoolConfig, WorkerPoolConfigBuilder};
use crate::error::{AdmissionError, PoolError};
use crate::events::PoolEvent;
use crate::latency::{LatencySummary, LatencyWindow};
use crate::task::{Runnable, Task, TaskContext, TaskHandle, TaskMeta, TaskOptions, TaskOutcome};
use backpressure_circuitbreaker::{CircuitBreaker, Permit};
use backpressure_core::{BackpressureError, Priority};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

type Rejection = BackpressureError<Infallible>;

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Live workers, including ones retiring after their current task.
    pub workers: usize,
    /// Worker count the pool is converging to.
    pub target_workers: usize,
    /// Workers executing a task body.
    pub busy: usize,
    /// Workers parked waiting for work.
    pub idle: usize,
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Configured queue capacity.
    pub queue_capacity: usize,
    /// Outstanding admission tickets.
    pub in_flight: usize,
    /// Configured concurrency bound.
    pub max_concurrency: usize,
    /// Every submission attempt.
    pub offered: u64,
    /// Submissions that entered the queue.
    pub accepted: u64,
    /// Tasks resolved without running, at submission or by a worker.
    pub rejected: u64,
    /// Bodies that returned `Ok`.
    pub completed: u64,
    /// Bodies that returned `Err`.
    pub failed: u64,
    /// Bodies that panicked.
    pub panicked: u64,
    /// Recent latencies.
    pub latency: LatencySummary,
}

#[derive(Debug, Default)]
struct Counters {
    offered: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

struct QueueState {
    tasks: VecDeque<Box<dyn Runnable>>,
    /// Live workers.
    workers: usize,
    /// Workers asked to exit after their current task.
    retiring: usize,
    /// Workers parked on the notifier. Informational only; a freshly spawned
    /// worker can take a task before it has ever parked.
    idle: usize,
    /// Workers holding a dequeued task that is not yet admitted.
    admitting: usize,
    accepting: bool,
}

struct Inner {
    config: WorkerPoolConfig,
    admission: AdmissionController,
    breaker: Option<CircuitBreaker>,
    queue: Mutex<QueueState>,
    notify: Notify,
    busy: AtomicUsize,
    /// Cancelled when shutdown begins; handed to task bodies.
    shutdown: CancellationToken,
    /// Cancelled when the shutdown deadline fires; interrupts admission waits.
    abort: CancellationToken,
    latency: Mutex<LatencyWindow>,
    counters: Counters,
    next_worker: AtomicUsize,
}

/// A bounded worker pool.
///
/// Submitting never blocks: a task either enters the bounded queue or is
/// rejected on the spot. A fixed set of workers takes tasks off the queue,
/// acquires an admission ticket, runs the body and resolves the task's
/// [`TaskHandle`]. No task is spawned per submission.
///
/// # Examples
///
/// ```
/// use backpressure_core::Priority;
/// use backpressure_pool::{TaskOptions, WorkerPool};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = WorkerPool::builder()
///     .min_workers(2)
///     .max_workers(4)
///     .queue_capacity(16)
///     .build()
///     .unwrap();
///
/// let handle = pool
///     .submit(TaskOptions::new(Priority::Normal), |_ctx| async { Ok::<_, ()>(21 * 2) })
///     .unwrap();
/// assert_eq!(handle.await, Ok(42));
///
/// pool.shutdown(Duration::from_secs(1)).await.unwrap();
/// # }
/// ```
pub struct WorkerPool {
    inner: Arc<Inner>,
    workers: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Creates a new configuration builder.
    pub fn builder() -> WorkerPoolConfigBuilder {
        WorkerPoolConfigBuilder::new()
    }

    pub(crate) fn start(
        config: WorkerPoolConfig,
        admission: AdmissionController,
        breaker: Option<CircuitBreaker>,
        initial_workers: usize,
    ) -> Self {
        let latency = LatencyWindow::new(config.latency_window, config.latency_horizon);
        let pool = Self {
            inner: Arc::new(Inner {
                config,
                admission,
                breaker,
                queue: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    workers: initial_workers,
                    retiring: 0,
                    idle: 0,
                    admitting: 0,
                    accepting: true,
                }),
                notify: Notify::new(),
                busy: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
                abort: CancellationToken::new(),
                latency: Mutex::new(latency),
                counters: Counters::default(),
                next_worker: AtomicUsize::new(0),
            }),
            workers: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        };

        pool.spawn_workers(&mut pool.join_set(), initial_workers);

        #[cfg(feature = "tracing")]
        tracing::info!(
            pool = %pool.inner.config.name,
            workers = initial_workers,
            queue_capacity = pool.inner.config.queue_capacity,
            max_concurrency = pool.inner.admission.max_concurrency(),
            "worker pool started"
        );

        pool
    }

    /// Offers a task to the pool without waiting.
    ///
    /// Fails with [`PoolError::QueueFull`] when the queue is at capacity and
    /// with [`PoolError::Shutdown`] once shutdown has begun. On success the
    /// returned handle resolves exactly once.
    pub fn submit<F, Fut, T, E>(
        &self,
        options: TaskOptions,
        f: F,
    ) -> Result<TaskHandle<T, E>, PoolError>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let inner = &self.inner;
        inner.counters.offered.fetch_add(1, Ordering::Relaxed);
        let (task, handle) = Task::new(options, f);

        let queued = {
            let mut state = inner.queue();
            if !state.accepting {
                Err(PoolError::Shutdown)
            } else if !inner.has_room(&state) {
                Err(PoolError::QueueFull {
                    capacity: inner.config.queue_capacity,
                })
            } else {
                state.tasks.push_back(Box::new(task));
                Ok(state.tasks.len())
            }
        };

        let queue_depth = match queued {
            Ok(depth) => depth,
            Err(err) => {
                inner.note_rejected(options.priority, &Rejection::from(err.clone()));
                return Err(err);
            }
        };

        inner.notify.notify_one();
        inner.counters.accepted.fetch_add(1, Ordering::Relaxed);

        inner.config.event_listeners.emit(&PoolEvent::TaskAccepted {
            pattern_name: inner.config.name.clone(),
            timestamp: Instant::now(),
            priority: options.priority,
            queue_depth,
        });

        #[cfg(feature = "metrics")]
        {
            counter!("pool_tasks_total", "pool" => inner.config.name.clone(), "result" => "accepted").increment(1);
            gauge!("pool_queue_depth", "pool" => inner.config.name.clone()).set(queue_depth as f64);
        }

        Ok(handle)
    }

    /// Moves the worker count towards `n`, clamped to `[min_workers, max_workers]`.
    ///
    /// New workers start immediately. Excess workers exit after finishing
    /// their current task; no running task is interrupted. Returns the
    /// clamped target. Has no effect once shutdown has begun.
    pub fn set_worker_count(&self, n: usize) -> usize {
        let inner = &self.inner;
        let target = n.clamp(inner.config.min_workers, inner.config.max_workers);

        // Holding the join set across the update keeps shutdown from
        // missing workers spawned here.
        let mut workers = self.join_set();
        let (from, spawn) = {
            let mut state = inner.queue();
            let current = state.workers - state.retiring;
            if !state.accepting || current == target {
                return current;
            }
            if target > current {
                let add = target - current;
                let unretired = add.min(state.retiring);
                state.retiring -= unretired;
                state.workers += add - unretired;
                (current, add - unretired)
            } else {
                state.retiring += current - target;
                (current, 0)
            }
        };

        if target < from {
            inner.notify.notify_waiters();
        }
        self.spawn_workers(&mut workers, spawn);
        drop(workers);

        #[cfg(feature = "tracing")]
        tracing::info!(pool = %inner.config.name, from, to = target, "resizing worker pool");

        #[cfg(feature = "metrics")]
        gauge!("pool_target_workers", "pool" => inner.config.name.clone()).set(target as f64);

        inner.config.event_listeners.emit(&PoolEvent::WorkersResized {
            pattern_name: inner.config.name.clone(),
            timestamp: Instant::now(),
            from,
            to: target,
        });

        target
    }

    /// Stops accepting work and waits for the queue to drain.
    ///
    /// Task bodies observe the shutdown through
    /// [`TaskContext::is_shutting_down`]. If every worker exits within
    /// `deadline` this returns `Ok(())`. Otherwise the tasks still queued are
    /// resolved with [`BackpressureError::Shutdown`], running bodies are left
    /// to finish on their own, and [`PoolError::ShutdownTimeout`] is returned.
    /// A second call returns [`PoolError::Shutdown`].
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), PoolError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(PoolError::Shutdown);
        }

        let inner = &self.inner;
        let queued = inner.close();

        #[cfg(feature = "tracing")]
        tracing::info!(pool = %inner.config.name, queued, ?deadline, "worker pool shutting down");

        inner.config.event_listeners.emit(&PoolEvent::ShutdownStarted {
            pattern_name: inner.config.name.clone(),
            timestamp: Instant::now(),
            queued,
        });

        let mut workers = std::mem::take(&mut *self.join_set());
        let drained = tokio::time::timeout(deadline, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        let abandoned = if drained {
            0
        } else {
            inner.abort.cancel();
            let stranded: Vec<_> = inner.queue().tasks.drain(..).collect();
            let abandoned = stranded.len();
            for task in stranded {
                inner.reject(task, BackpressureError::Shutdown);
            }
            workers.detach_all();

            #[cfg(feature = "tracing")]
            tracing::warn!(
                pool = %inner.config.name,
                abandoned,
                "shutdown deadline reached; running tasks left to finish"
            );

            abandoned
        };

        #[cfg(feature = "tracing")]
        if drained {
            tracing::info!(pool = %inner.config.name, "worker pool drained");
        }

        inner.config.event_listeners.emit(&PoolEvent::ShutdownFinished {
            pattern_name: inner.config.name.clone(),
            timestamp: Instant::now(),
            abandoned,
        });

        if drained {
            Ok(())
        } else {
            Err(PoolError::ShutdownTimeout { abandoned })
        }
    }

    /// Returns true once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes a consistent snapshot of the pool.
    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        let (workers, target_workers, idle, queue_depth) = {
            let state = inner.queue();
            (
                state.workers,
                state.workers - state.retiring,
                state.idle,
                state.tasks.len(),
            )
        };
        let c = &inner.counters;

        PoolStats {
            workers,
            target_workers,
            busy: inner.busy.load(Ordering::Acquire),
            idle,
            queue_depth,
            queue_capacity: inner.config.queue_capacity,
            in_flight: inner.admission.in_flight(),
            max_concurrency: inner.admission.max_concurrency(),
            offered: c.offered.load(Ordering::Relaxed),
            accepted: c.accepted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
            latency: inner.latency().summary(Instant::now()),
        }
    }

    /// Live worker count.
    pub fn workers(&self) -> usize {
        self.inner.queue().workers
    }

    /// Workers executing a task body.
    pub fn busy(&self) -> usize {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Tasks waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue().tasks.len()
    }

    /// Lower bound of the worker count.
    pub fn min_workers(&self) -> usize {
        self.inner.config.min_workers
    }

    /// Upper bound of the worker count.
    pub fn max_workers(&self) -> usize {
        self.inner.config.max_workers
    }

    /// The admission controller workers acquire through.
    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    /// The circuit breaker consulted for guarded tasks, if any.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.inner.breaker.as_ref()
    }

    /// Returns the pool name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    fn join_set(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_workers(&self, workers: &mut JoinSet<()>, count: usize) {
        // Reap workers that already retired.
        while workers.try_join_next().is_some() {}

        for _ in 0..count {
            let id = self.inner.next_worker.fetch_add(1, Ordering::Relaxed);
            workers.spawn(run_worker(Arc::clone(&self.inner), id));
        }

        #[cfg(feature = "metrics")]
        gauge!("pool_workers", "pool" => self.inner.config.name.clone())
            .set(self.inner.queue().workers as f64);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.inner.close();
            self.inner.abort.cancel();
        }
        // Let running bodies finish; idle workers exit on their own.
        self.join_set().detach_all();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latency(&self) -> MutexGuard<'_, LatencyWindow> {
        self.latency.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_room(&self, state: &QueueState) -> bool {
        let waiting = state.tasks.len();
        match self.config.queue_capacity {
            // Hand-off only: some worker that is neither running, admitting
            // nor retiring must be able to start the task now.
            0 => {
                let free = state
                    .workers
                    .saturating_sub(state.retiring)
                    .saturating_sub(self.busy.load(Ordering::Acquire))
                    .saturating_sub(state.admitting);
                free > waiting && self.admission.available() > waiting + state.admitting
            }
            capacity => waiting < capacity,
        }
    }

    /// Stops accepting, signals task bodies and wakes parked workers.
    /// Returns the number of tasks still queued.
    fn close(&self) -> usize {
        let queued = {
            let mut state = self.queue();
            state.accepting = false;
            state.tasks.len()
        };
        self.shutdown.cancel();
        self.notify.notify_waiters();
        queued
    }

    /// Waits for the next task. `None` tells the worker to exit.
    async fn next_task(&self) -> Option<Box<dyn Runnable>> {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            // Register before checking so a wakeup between the check and
            // the await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.queue();
                if state.retiring > 0 {
                    state.retiring -= 1;
                    state.workers -= 1;
                    return None;
                }
                if let Some(task) = state.tasks.pop_front() {
                    state.admitting += 1;
                    return Some(task);
                }
                if !state.accepting {
                    state.workers -= 1;
                    return None;
                }
                state.idle += 1;
            }

            notified.await;
            self.queue().idle -= 1;
        }
    }

    async fn execute(&self, task: Box<dyn Runnable>) {
        let meta = *task.meta();
        let admitted = self.admit(&meta).await;
        if admitted.is_ok() {
            // Busy before leaving `admitting`: never briefly free to `has_room`.
            self.busy.fetch_add(1, Ordering::AcqRel);
        }
        self.queue().admitting -= 1;

        let (mut ticket, permit) = match admitted {
            Ok(admitted) => admitted,
            Err(reason) => {
                self.reject(task, reason);
                return;
            }
        };

        let ctx = TaskContext::new(meta, self.shutdown.clone());
        let started = Instant::now();

        let outcome = task.run(ctx).await;

        let service = started.elapsed();
        self.busy.fetch_sub(1, Ordering::AcqRel);
        let released = ticket.release();
        debug_assert!(released.is_ok(), "ticket released twice: {released:?}");

        if let (Some(breaker), Some(permit)) = (&self.breaker, permit) {
            match outcome {
                TaskOutcome::Success => breaker.record_success(permit),
                TaskOutcome::Failure | TaskOutcome::Panicked => breaker.record_failure(permit),
            }
        }

        self.latency()
            .record(Instant::now(), service, meta.submitted_at.elapsed());

        let counter = match outcome {
            TaskOutcome::Success => &self.counters.completed,
            TaskOutcome::Failure => &self.counters.failed,
            TaskOutcome::Panicked => &self.counters.panicked,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        if outcome == TaskOutcome::Panicked {
            tracing::warn!(pool = %self.config.name, priority = %meta.options.priority, "task panicked");
        }

        #[cfg(feature = "metrics")]
        {
            counter!("pool_tasks_total", "pool" => self.config.name.clone(), "result" => outcome.as_str()).increment(1);
            histogram!("pool_task_duration_seconds", "pool" => self.config.name.clone())
                .record(service.as_secs_f64());
        }

        self.config.event_listeners.emit(&PoolEvent::TaskFinished {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            priority: meta.options.priority,
            outcome,
            duration: service,
        });
    }

    /// Deadline check, admission ticket, then the breaker for guarded tasks.
    async fn admit(&self, meta: &TaskMeta) -> Result<(Ticket, Option<Permit>), Rejection> {
        if meta.expired(Instant::now()) {
            return Err(BackpressureError::DeadlineExceeded);
        }

        let acquire = self.admission.acquire(&self.abort);
        let acquired = match meta.options.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), acquire)
                .await
                .unwrap_or(Err(AdmissionError::Timeout)),
            None => acquire.await,
        };

        let ticket = acquired.map_err(|err| match err {
            // Only the shutdown deadline cancels or closes admission.
            AdmissionError::Cancelled | AdmissionError::Closed => BackpressureError::Shutdown,
            other => other.into(),
        })?;

        let permit = match (&self.breaker, meta.options.guarded) {
            (Some(breaker), true) => Some(breaker.allow()?),
            _ => None,
        };

        Ok((ticket, permit))
    }

    fn reject(&self, task: Box<dyn Runnable>, reason: Rejection) {
        self.note_rejected(task.meta().options.priority, &reason);
        task.reject(reason);
    }

    fn note_rejected(&self, priority: Priority, reason: &Rejection) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::debug!(pool = %self.config.name, %priority, reason = reason.kind(), "task rejected");

        #[cfg(feature = "metrics")]
        counter!("pool_tasks_total", "pool" => self.config.name.clone(), "result" => reason.kind()).increment(1);

        self.config.event_listeners.emit(&PoolEvent::TaskRejected {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            priority,
            reason: reason.kind(),
        });
    }
}

async fn run_worker(inner: Arc<Inner>, id: usize) {
    #[cfg(feature = "tracing")]
    tracing::trace!(pool = %inner.config.name, worker = id, "worker started");

    while let Some(task) = inner.next_task().await {
        inner.execute(task).await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(pool = %inner.config.name, worker = id, "worker exited");
    #[cfg(not(feature = "tracing"))]
    let _ = id;
}
