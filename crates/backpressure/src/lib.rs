//! Bounded concurrency and backpressure engine.
//!
//! `backpressure` accepts units of work, bounds how many run at once, and
//! rejects or delays work under saturation instead of failing
//! catastrophically. The engine composes six components, each available as
//! its own crate:
//!
//! - **Load shedder** ([`backpressure_shedder`]): rejects low-priority work
//!   first once the composite load score crosses its threshold
//! - **Rate limiter** ([`backpressure_ratelimiter`]): lazily refilled token bucket
//! - **Admission controller** ([`backpressure_pool::AdmissionController`]):
//!   at most `max_concurrency` tasks run at once
//! - **Worker pool** ([`backpressure_pool::WorkerPool`]): fixed set of workers
//!   pulling from one bounded FIFO queue
//! - **Circuit breaker** ([`backpressure_circuitbreaker`]): fails guarded
//!   tasks fast while a dependency is down
//! - **Capacity controller** ([`backpressure_capacity`]): resizes the pool
//!   with Little's law and publishes the load snapshot
//!
//! A submission flows `shedder -> queue -> rate limiter -> concurrency slot
//! -> breaker -> body`. Submission never waits: a task is either queued or
//! rejected on the spot. Once queued, its [`TaskHandle`] resolves exactly
//! once, with the body's result or the reason it never ran.
//!
//! # Example
//!
//! ```
//! use backpressure::{BackpressureError, Engine, Priority};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = Engine::builder()
//!     .name("thumbnails")
//!     .workers(2, 8)
//!     .max_concurrency(4)
//!     .queue_capacity(64)
//!     .build()
//!     .unwrap();
//!
//! match engine.submit(Priority::High, |_ctx| async { Ok::<_, std::io::Error>("resized") }) {
//!     Ok(handle) => println!("{:?}", handle.await),
//!     Err(BackpressureError::ShedLoad { .. }) => println!("busy, try later"),
//!     Err(e) => println!("rejected: {e}"),
//! }
//!
//! engine.shutdown(Duration::from_secs(5)).await.unwrap();
//! # }
//! ```
//!
//! # Configuration
//!
//! [`EngineConfig`] is plain data. With the `serde` feature it can be
//! deserialized from a front-end's configuration file; [`Engine::new`] builds
//! an engine from it. [`EngineBuilder`] adds the clock and event hooks.
//!
//! # Feature Flags
//!
//! - `metrics`: every component reports through the `metrics` facade
//! - `serde`: `Serialize`/`Deserialize` for the configuration types
//!
//! Lifecycle logging through `tracing` is always on.

mod config;
mod engine;
mod service;

pub use config::{
    CapacityControlConfig, CircuitBreakerSettings, EngineBuilder, EngineConfig, RateLimitConfig,
};
pub use engine::Engine;
pub use service::{EngineFuture, EngineService, Job};

pub use backpressure_core::{BackpressureError, ConfigError, LoadMetrics, Priority};
pub use backpressure_pool::{PoolStats, TaskContext, TaskHandle, TaskOptions, TaskOutcome};
pub use backpressure_shedder::{ShedThresholds, ShedWeights};

pub use backpressure_capacity;
pub use backpressure_circuitbreaker;
pub use backpressure_core;
pub use backpressure_pool;
pub use backpressure_ratelimiter;
pub use backpressure_shedder;
