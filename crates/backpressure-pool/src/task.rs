//! Units of work and the handles their submitters hold.

use backpressure_core::{BackpressureError, Priority};
use futures::future::BoxFuture;
use futures::FutureExt;
use pin_project_lite::pin_project;
use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Per-submission options.
///
/// # Examples
///
/// ```
/// use backpressure_core::Priority;
/// use backpressure_pool::TaskOptions;
/// use std::time::Duration;
///
/// let options = TaskOptions::new(Priority::High)
///     .timeout(Duration::from_secs(2))
///     .guarded();
/// assert!(options.deadline.is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskOptions {
    /// Scheduling priority, used by the load shedder.
    pub priority: Priority,
    /// Latest instant at which the task may still start.
    pub deadline: Option<Instant>,
    /// Whether the task is gated by the pool's circuit breaker.
    pub guarded: bool,
}

impl TaskOptions {
    /// Options with the given priority, no deadline, not guarded.
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Sets an absolute start deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a start deadline relative to now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Gates the task behind the pool's circuit breaker.
    pub fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }
}

impl From<Priority> for TaskOptions {
    fn from(priority: Priority) -> Self {
        Self::new(priority)
    }
}

/// How a task body finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The body returned `Ok`.
    Success,
    /// The body returned `Err`.
    Failure,
    /// The body panicked.
    Panicked,
}

impl TaskOutcome {
    /// Returns the outcome name, as used in metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failure => "failure",
            TaskOutcome::Panicked => "panicked",
        }
    }
}

/// Information handed to a running task body.
#[derive(Debug, Clone)]
pub struct TaskContext {
    priority: Priority,
    submitted_at: Instant,
    deadline: Option<Instant>,
    shutdown: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(meta: TaskMeta, shutdown: CancellationToken) -> Self {
        Self {
            priority: meta.options.priority,
            submitted_at: meta.submitted_at,
            deadline: meta.options.deadline,
            shutdown,
        }
    }

    /// Priority the task was submitted with.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// When the task was accepted.
    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Start deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline. `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the pool has begun shutting down.
    ///
    /// Long-running bodies may use this to wind down early. The pool never
    /// aborts a running body.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the pool begins shutting down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskMeta {
    pub(crate) options: TaskOptions,
    pub(crate) submitted_at: Instant,
}

impl TaskMeta {
    pub(crate) fn expired(&self, now: Instant) -> bool {
        self.options.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Type-erased task as seen by the workers.
pub(crate) trait Runnable: Send {
    fn meta(&self) -> &TaskMeta;

    /// Runs the body and resolves the handle. Panics are caught.
    fn run(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, TaskOutcome>;

    /// Resolves the handle without running the body.
    fn reject(self: Box<Self>, reason: BackpressureError<Infallible>);
}

type Body<T, E> = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, Result<T, E>> + Send>;
type Reply<T, E> = oneshot::Sender<Result<T, BackpressureError<E>>>;

pub(crate) struct Task<T, E> {
    meta: TaskMeta,
    body: Body<T, E>,
    reply: Reply<T, E>,
}

impl<T, E> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new<F, Fut>(options: TaskOptions, f: F) -> (Self, TaskHandle<T, E>)
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let task = Task {
            meta: TaskMeta {
                options,
                submitted_at: Instant::now(),
            },
            body: Box::new(move |ctx| f(ctx).boxed()),
            reply,
        };
        let handle = TaskHandle {
            rx,
            priority: options.priority,
        };
        (task, handle)
    }
}

impl<T, E> Runnable for Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn run(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, TaskOutcome> {
        let Task { body, reply, .. } = *self;

        async move {
            let result = AssertUnwindSafe(async move { body(ctx).await })
                .catch_unwind()
                .await;

            let (outcome, result) = match result {
                Ok(Ok(value)) => (TaskOutcome::Success, Ok(value)),
                Ok(Err(err)) => (TaskOutcome::Failure, Err(BackpressureError::Application(err))),
                Err(payload) => (
                    TaskOutcome::Panicked,
                    Err(BackpressureError::Panicked {
                        message: panic_message(payload.as_ref()),
                    }),
                ),
            };

            // The submitter may have dropped its handle.
            let _ = reply.send(result);
            outcome
        }
        .boxed()
    }

    fn reject(self: Box<Self>, reason: BackpressureError<Infallible>) {
        let Task { reply, .. } = *self;
        let _ = reply.send(Err(reason.map_application(|never| match never {})));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

pin_project! {
    /// Resolves with the task's result or the reason it never ran.
    ///
    /// Resolves exactly once. If the pool is dropped before the task is
    /// resolved, the handle yields [`BackpressureError::Shutdown`]. Dropping
    /// the handle does not cancel the task.
    pub struct TaskHandle<T, E> {
        #[pin]
        rx: oneshot::Receiver<Result<T, BackpressureError<E>>>,
        priority: Priority,
    }
}

impl<T, E> TaskHandle<T, E> {
    /// Priority the task was submitted with.
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, BackpressureError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BackpressureError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> std::fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("priority", &self.priority)
            .finish()
    }
}
