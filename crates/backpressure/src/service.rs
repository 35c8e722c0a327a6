//! `tower::Service` adapter for the engine.

use crate::Engine;
use backpressure_core::{BackpressureError, Priority};
use backpressure_pool::{TaskContext, TaskHandle, TaskOptions};
use pin_project_lite::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::Service;

/// A unit of work submitted through [`EngineService`].
pub struct Job<F> {
    options: TaskOptions,
    work: F,
}

impl<F> Job<F> {
    /// A job with the given priority.
    pub fn new(priority: Priority, work: F) -> Self {
        Self::with_options(TaskOptions::new(priority), work)
    }

    /// A job with explicit options.
    pub fn with_options(options: TaskOptions, work: F) -> Self {
        Self { options, work }
    }

    /// Gates the job behind the engine's circuit breaker.
    pub fn guarded(mut self) -> Self {
        self.options = self.options.guarded();
        self
    }

    /// Options the job will be submitted with.
    pub fn options(&self) -> &TaskOptions {
        &self.options
    }
}

impl<F> fmt::Debug for Job<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("options", &self.options)
            .finish()
    }
}

/// Exposes an [`Engine`] as a `tower::Service`.
///
/// Each call submits one [`Job`]. Rejections at submission time (shed,
/// queue full, shutdown) resolve the response future immediately; the
/// service never buffers work of its own.
///
/// # Examples
///
/// ```
/// use backpressure::{Engine, Job, Priority, TaskContext};
/// use tower::ServiceExt;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = Engine::builder().build().unwrap();
///
/// let job = Job::new(Priority::Normal, |_ctx: TaskContext| async { Ok::<_, std::io::Error>("done") });
/// let response = engine.service().oneshot(job).await.unwrap();
/// assert_eq!(response, "done");
/// # engine.shutdown(Duration::from_secs(1)).await.unwrap();
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct EngineService {
    engine: Engine,
}

impl EngineService {
    /// Wraps an engine.
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Returns a reference to the engine.
    pub fn get_ref(&self) -> &Engine {
        &self.engine
    }

    /// Consumes the service and returns the engine.
    pub fn into_inner(self) -> Engine {
        self.engine
    }
}

impl Engine {
    /// Returns a `tower::Service` submitting to this engine.
    pub fn service(&self) -> EngineService {
        EngineService::new(self.clone())
    }
}

impl<F, Fut, T, E> Service<Job<F>> for EngineService
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Response = T;
    type Error = BackpressureError<E>;
    type Future = EngineFuture<T, E>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.engine.is_shutdown() {
            Poll::Ready(Err(BackpressureError::Shutdown))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, job: Job<F>) -> Self::Future {
        let kind = match self.engine.submit_with(job.options, job.work) {
            Ok(handle) => Kind::Submitted { handle },
            Err(error) => Kind::Rejected { error: Some(error) },
        };
        EngineFuture { kind }
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<T, E> {
        Submitted { #[pin] handle: TaskHandle<T, E> },
        Rejected { error: Option<BackpressureError<E>> },
    }
}

pin_project! {
    /// Response future of [`EngineService`].
    pub struct EngineFuture<T, E> {
        #[pin]
        kind: Kind<T, E>,
    }
}

impl<T, E> Future for EngineFuture<T, E> {
    type Output = Result<T, BackpressureError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Submitted { handle } => handle.poll(cx),
            KindProj::Rejected { error } => match error.take() {
                Some(error) => Poll::Ready(Err(error)),
                None => panic!("EngineFuture polled after completion"),
            },
        }
    }
}

impl<T, E> fmt::Debug for EngineFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineFuture").finish_non_exhaustive()
    }
}
