//! Bounded worker pool and admission control.
//!
//! Work flows through two gates:
//!
//! 1. [`WorkerPool::submit`] places the task in a bounded FIFO queue or
//!    rejects it on the spot. It never waits.
//! 2. A worker dequeues the task and asks the [`AdmissionController`] for a
//!    [`Ticket`]: a rate limiter token first, then one of `max_concurrency`
//!    slots. Only then does the body run.
//!
//! Every task resolves its [`TaskHandle`] exactly once: with the body's
//! result, with [`BackpressureError::Panicked`](backpressure_core::BackpressureError::Panicked)
//! if it panicked, or with the reason it never ran. A panicking body never
//! leaks its slot and never kills its worker.
//!
//! # Resizing
//!
//! [`WorkerPool::set_worker_count`] grows the pool immediately and shrinks it
//! by letting excess workers exit after their current task.
//!
//! # Shutdown
//!
//! [`WorkerPool::shutdown`] stops intake, lets the workers drain the queue and
//! waits for them up to a deadline. Tasks still queued at the deadline are
//! resolved with `Shutdown`; running bodies are never aborted.
//!
//! # Feature Flags
//!
//! - `metrics`: queue depth, worker counts, task outcomes and durations
//! - `tracing`: lifecycle logs, rejections, and a loud error on double release

mod admission;
mod config;
mod error;
mod events;
mod latency;
mod pool;
mod task;

pub use admission::{AdmissionController, AdmissionControllerBuilder, Ticket};
pub use config::{WorkerPoolConfig, WorkerPoolConfigBuilder};
pub use error::{AdmissionError, PoolError};
pub use events::PoolEvent;
pub use latency::LatencySummary;
pub use pool::{PoolStats, WorkerPool};
pub use task::{TaskContext, TaskHandle, TaskOptions, TaskOutcome};
