//! Common error types for backpressure components.
//!
//! [`BackpressureError`] is the single error a submitter ever sees. Every
//! component error converts into it, so composing the shedder, the rate
//! limiter, the admission gate and the pool needs no hand-written `From`
//! impls.
//!
//! # Pattern Matching
//!
//! ```rust
//! use backpressure_core::BackpressureError;
//!
//! # #[derive(Debug)]
//! # struct AppError;
//! # impl std::fmt::Display for AppError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { Ok(()) }
//! # }
//! # impl std::error::Error for AppError {}
//! fn handle_error(error: BackpressureError<AppError>) {
//!     match error {
//!         BackpressureError::QueueFull { capacity } => {
//!             eprintln!("queue full ({capacity}), backing off");
//!         }
//!         BackpressureError::ShedLoad { priority, .. } => {
//!             eprintln!("{priority} work shed under load");
//!         }
//!         BackpressureError::Application(app_err) => {
//!             eprintln!("task failed: {app_err}");
//!         }
//!         other if other.is_recoverable() => eprintln!("retry later: {other}"),
//!         other => eprintln!("giving up: {other}"),
//!     }
//! }
//! ```

use crate::priority::Priority;
use std::fmt;
use std::time::Duration;

/// Every outcome of a submission other than success.
///
/// Engine-generated rejections are the named variants; the error returned by
/// the task body itself is carried untouched in [`BackpressureError::Application`].
///
/// # Type Parameters
///
/// - `E`: The error type returned by task bodies
#[derive(Debug, Clone, PartialEq)]
pub enum BackpressureError<E> {
    /// The token bucket had no token for this task.
    RateLimited {
        /// Time until the next token is expected, if the refill rate is non-zero.
        retry_after: Option<Duration>,
    },

    /// The bounded queue was at capacity.
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The circuit breaker guarding the task's dependency is open.
    CircuitOpen {
        /// Breaker name.
        name: Option<String>,
    },

    /// The load shedder rejected the task for its priority.
    ShedLoad {
        /// Priority of the rejected task.
        priority: Priority,
        /// Composite load score at the time of the decision.
        score: f64,
    },

    /// The engine is shutting down and the task will not run.
    Shutdown,

    /// An admission ticket was released twice.
    ///
    /// This is a programming fault: it would otherwise corrupt the
    /// concurrency bound.
    DoubleRelease,

    /// The caller's cancellation token fired before a concurrency slot was free.
    Cancelled,

    /// The task's deadline passed before it could start.
    DeadlineExceeded,

    /// The task body panicked. The worker survived and the slot was released.
    Panicked {
        /// Panic payload rendered as text, when it was a string.
        message: String,
    },

    /// The task body returned an error.
    Application(E),
}

impl<E> fmt::Display for BackpressureError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressureError::RateLimited { retry_after } => match retry_after {
                Some(d) => write!(f, "rate limited, retry after {:?}", d),
                None => write!(f, "rate limited"),
            },
            BackpressureError::QueueFull { capacity } => {
                write!(f, "queue full (capacity {})", capacity)
            }
            BackpressureError::CircuitOpen { name } => match name {
                Some(n) => write!(f, "circuit breaker '{}' is open", n),
                None => write!(f, "circuit breaker is open"),
            },
            BackpressureError::ShedLoad { priority, score } => {
                write!(f, "{} priority task shed at load {:.2}", priority, score)
            }
            BackpressureError::Shutdown => write!(f, "engine is shutting down"),
            BackpressureError::DoubleRelease => {
                write!(f, "admission ticket released more than once")
            }
            BackpressureError::Cancelled => write!(f, "cancelled while waiting for a slot"),
            BackpressureError::DeadlineExceeded => write!(f, "task deadline exceeded"),
            BackpressureError::Panicked { message } => write!(f, "task panicked: {}", message),
            BackpressureError::Application(e) => write!(f, "task error: {}", e),
        }
    }
}

impl<E> std::error::Error for BackpressureError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackpressureError::Application(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> BackpressureError<E> {
    /// Returns `true` if this is a rate limiter rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackpressureError::RateLimited { .. })
    }

    /// Returns `true` if the queue was full.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, BackpressureError::QueueFull { .. })
    }

    /// Returns `true` if a circuit breaker rejected the task.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BackpressureError::CircuitOpen { .. })
    }

    /// Returns `true` if the load shedder rejected the task.
    pub fn is_shed(&self) -> bool {
        matches!(self, BackpressureError::ShedLoad { .. })
    }

    /// Returns `true` if the engine was shutting down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, BackpressureError::Shutdown)
    }

    /// Returns `true` if the task body panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, BackpressureError::Panicked { .. })
    }

    /// Returns `true` if this wraps a task body error.
    pub fn is_application(&self) -> bool {
        matches!(self, BackpressureError::Application(_))
    }

    /// Returns `true` if the engine rejected the task before (or instead of)
    /// running it.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            BackpressureError::Application(_) | BackpressureError::Panicked { .. }
        )
    }

    /// Returns `true` if resubmitting later can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BackpressureError::RateLimited { .. }
                | BackpressureError::QueueFull { .. }
                | BackpressureError::CircuitOpen { .. }
                | BackpressureError::ShedLoad { .. }
        )
    }

    /// Short machine-readable label, as used in metric labels and events.
    pub fn kind(&self) -> &'static str {
        match self {
            BackpressureError::RateLimited { .. } => "rate_limited",
            BackpressureError::QueueFull { .. } => "queue_full",
            BackpressureError::CircuitOpen { .. } => "circuit_open",
            BackpressureError::ShedLoad { .. } => "shed_load",
            BackpressureError::Shutdown => "shutdown",
            BackpressureError::DoubleRelease => "double_release",
            BackpressureError::Cancelled => "cancelled",
            BackpressureError::DeadlineExceeded => "deadline_exceeded",
            BackpressureError::Panicked { .. } => "panicked",
            BackpressureError::Application(_) => "application",
        }
    }

    /// Extracts the task body error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            BackpressureError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the task body error using a function.
    ///
    /// # Examples
    ///
    /// ```
    /// use backpressure_core::BackpressureError;
    ///
    /// let err: BackpressureError<String> = BackpressureError::Application("boom".to_string());
    /// let mapped: BackpressureError<usize> = err.map_application(|s| s.len());
    /// assert_eq!(mapped.application_error(), Some(4));
    /// ```
    pub fn map_application<F, T>(self, f: F) -> BackpressureError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            BackpressureError::RateLimited { retry_after } => {
                BackpressureError::RateLimited { retry_after }
            }
            BackpressureError::QueueFull { capacity } => BackpressureError::QueueFull { capacity },
            BackpressureError::CircuitOpen { name } => BackpressureError::CircuitOpen { name },
            BackpressureError::ShedLoad { priority, score } => {
                BackpressureError::ShedLoad { priority, score }
            }
            BackpressureError::Shutdown => BackpressureError::Shutdown,
            BackpressureError::DoubleRelease => BackpressureError::DoubleRelease,
            BackpressureError::Cancelled => BackpressureError::Cancelled,
            BackpressureError::DeadlineExceeded => BackpressureError::DeadlineExceeded,
            BackpressureError::Panicked { message } => BackpressureError::Panicked { message },
            BackpressureError::Application(e) => BackpressureError::Application(f(e)),
        }
    }

    /// Re-types an engine-generated error.
    ///
    /// Returns `None` for `Application`, which has no counterpart without
    /// a mapping function.
    pub fn cast<T>(self) -> Option<BackpressureError<T>> {
        match self {
            BackpressureError::Application(_) => None,
            other => Some(other.map_application(|_| unreachable!())),
        }
    }
}

/// Invalid construction-time configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid configuration `{field}`: {reason}")]
pub struct ConfigError {
    /// Name of the offending option.
    pub field: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl ConfigError {
    /// Creates a configuration error for `field`.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}
