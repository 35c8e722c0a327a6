use backpressure_core::BackpressureError;
use backpressure_ratelimiter::RateLimiterError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the [`AdmissionController`](crate::AdmissionController).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The rate limiter had no token. Never waits.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Time until the next token is expected.
        retry_after: Option<Duration>,
    },

    /// The cancellation token fired before a slot was free.
    #[error("cancelled while waiting for a concurrency slot")]
    Cancelled,

    /// No slot became free within the allowed wait.
    #[error("timed out waiting for a concurrency slot")]
    Timeout,

    /// Every slot is taken (non-waiting acquire only).
    #[error("all {max_concurrency} concurrency slots are in use")]
    Saturated {
        /// Configured concurrency bound.
        max_concurrency: usize,
    },

    /// A ticket was released more than once.
    #[error("admission ticket released more than once")]
    DoubleRelease,

    /// The controller was closed.
    #[error("admission controller is closed")]
    Closed,
}

impl From<RateLimiterError> for AdmissionError {
    fn from(err: RateLimiterError) -> Self {
        match err {
            RateLimiterError::RateLimitExceeded { retry_after } => {
                AdmissionError::RateLimited { retry_after }
            }
        }
    }
}

impl<E> From<AdmissionError> for BackpressureError<E> {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::RateLimited { retry_after } => {
                BackpressureError::RateLimited { retry_after }
            }
            AdmissionError::Cancelled => BackpressureError::Cancelled,
            AdmissionError::Timeout => BackpressureError::DeadlineExceeded,
            AdmissionError::Saturated { max_concurrency } => BackpressureError::QueueFull {
                capacity: max_concurrency,
            },
            AdmissionError::DoubleRelease => BackpressureError::DoubleRelease,
            AdmissionError::Closed => BackpressureError::Shutdown,
        }
    }
}

/// Errors returned by the [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The bounded queue is full.
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The pool no longer accepts work.
    #[error("worker pool is shut down")]
    Shutdown,

    /// Shutdown hit its deadline before the queue drained.
    #[error("shutdown deadline reached with {abandoned} queued tasks abandoned")]
    ShutdownTimeout {
        /// Queued tasks that were resolved with `Shutdown` instead of running.
        abandoned: usize,
    },
}

impl PoolError {
    /// Returns true if the queue was full.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, PoolError::QueueFull { .. })
    }
}

impl<E> From<PoolError> for BackpressureError<E> {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::QueueFull { capacity } => BackpressureError::QueueFull { capacity },
            PoolError::Shutdown => BackpressureError::Shutdown,
            PoolError::ShutdownTimeout { .. } => BackpressureError::DeadlineExceeded,
        }
    }
}
